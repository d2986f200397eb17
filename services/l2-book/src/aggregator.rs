//! Display aggregation of book levels into fixed-width price bins
//!
//! Bin flow:
//! 1. Take the top `depth_limit` levels per side (best price first)
//! 2. Lay a grid of `bin_width` steps over `[min - width, max + width]`,
//!    aligned to multiples of the width
//! 3. Bid bins are `[lower, upper)` labelled by the lower edge, offer bins
//!    are `(lower, upper]` labelled by the upper edge
//! 4. Sum quantity per bin and drop empty bins
//! 5. Emit both sides by representative price descending, ranked from the
//!    midpoint outward
//!
//! Boundary arithmetic is exact `Decimal`, never floating point.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::BookError;
use types::level::PriceLevel;
use types::side::Side;

use crate::order_book::BookView;

/// Parameters of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    bin_width: Decimal,
    depth_limit: Option<usize>,
}

impl AggregationConfig {
    /// Validate and build a configuration.
    ///
    /// `depth_limit = None` considers every level on each side.
    pub fn new(bin_width: Decimal, depth_limit: Option<usize>) -> Result<Self, BookError> {
        if bin_width <= Decimal::ZERO {
            return Err(BookError::invalid_config(format!(
                "bin width must be positive, got {bin_width}"
            )));
        }
        Ok(Self {
            bin_width,
            depth_limit,
        })
    }

    pub fn bin_width(&self) -> Decimal {
        self.bin_width
    }

    pub fn depth_limit(&self) -> Option<usize> {
        self.depth_limit
    }

    /// Aggregate a book view with this configuration.
    ///
    /// Fails with `InvalidPrice` or `InvalidQuantity` when a bin edge or a
    /// bin total does not fit in a `Decimal`.
    pub fn aggregate(&self, view: &BookView) -> Result<AggregatedView, BookError> {
        let limit = self.depth_limit.unwrap_or(usize::MAX);
        let bids = bin_side(&view.bids[..limit.min(view.bids.len())], Side::Bid, self.bin_width)?;
        let offers = bin_side(
            &view.offers[..limit.min(view.offers.len())],
            Side::Offer,
            self.bin_width,
        )?;

        Ok(AggregatedView {
            bin_width: self.bin_width,
            bids,
            offers,
        })
    }
}

/// Aggregate `view` into bins of `bin_width`, considering at most
/// `depth_limit` levels per side.
pub fn aggregate(
    view: &BookView,
    bin_width: Decimal,
    depth_limit: Option<usize>,
) -> Result<AggregatedView, BookError> {
    AggregationConfig::new(bin_width, depth_limit)?.aggregate(view)
}

/// One aggregated display row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBin {
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    /// Lower edge for bids, upper edge for offers.
    pub representative_price: Decimal,
    pub total_quantity: Decimal,
    pub side: Side,
    /// Zero-based distance from the midpoint within this side.
    pub rank: usize,
}

impl AggregationBin {
    /// External row identifier, e.g. `0_bid` or `4_ask`.
    pub fn row_id(&self) -> String {
        format!("{}_{}", self.rank, self.side.row_suffix())
    }

    /// Whether a price falls in this bin under the side's edge policy.
    pub fn contains(&self, price: Decimal) -> bool {
        match self.side {
            Side::Bid => self.lower_bound <= price && price < self.upper_bound,
            Side::Offer => self.lower_bound < price && price <= self.upper_bound,
        }
    }
}

/// Result of an aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedView {
    pub bin_width: Decimal,
    /// Bid bins, representative price descending.
    pub bids: Vec<AggregationBin>,
    /// Offer bins, representative price descending.
    pub offers: Vec<AggregationBin>,
}

impl AggregatedView {
    /// Combined sequence: offers above bids, both descending by price.
    pub fn rows(&self) -> impl Iterator<Item = &AggregationBin> {
        self.offers.iter().chain(self.bids.iter())
    }

    /// The `limit` rows closest to the midpoint, sorted by price descending.
    ///
    /// Rows are picked by rank; on equal rank the offer row comes first.
    pub fn display_window(&self, limit: usize) -> Vec<&AggregationBin> {
        let mut picked: Vec<&AggregationBin> = self.rows().collect();
        // Stable sort keeps offers ahead of bids on equal rank.
        picked.sort_by_key(|bin| bin.rank);
        picked.truncate(limit);
        picked.sort_by(|a, b| b.representative_price.cmp(&a.representative_price));
        picked
    }

    /// Headline text for a display: product and best aggregated bid.
    pub fn headline(&self, product: &str) -> String {
        match self.bids.first() {
            Some(best) => format!("{product}: {}", best.representative_price.normalize()),
            None => format!("{product}: -"),
        }
    }

    /// Total binned quantity on one side.
    pub fn total_quantity(&self, side: Side) -> Decimal {
        let bins = match side {
            Side::Bid => &self.bids,
            Side::Offer => &self.offers,
        };
        bins.iter()
            .fold(Decimal::ZERO, |acc, bin| acc.saturating_add(bin.total_quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.offers.is_empty()
    }
}

/// Grid span `[lower, upper]` padding the extremal prices by one bin.
fn grid_span(levels: &[PriceLevel], width: Decimal) -> Result<Option<(Decimal, Decimal)>, BookError> {
    let prices = || levels.iter().map(|l| l.price.as_decimal());
    let (Some(min), Some(max)) = (prices().min(), prices().max()) else {
        return Ok(None);
    };

    let lower = min
        .checked_div(width)
        .and_then(|steps| steps.checked_sub(Decimal::ONE))
        .and_then(|steps| steps.floor().checked_mul(width))
        .ok_or_else(|| off_grid(min, width))?;
    let upper = max
        .checked_div(width)
        .and_then(|steps| steps.checked_add(Decimal::ONE))
        .and_then(|steps| steps.ceil().checked_mul(width))
        .ok_or_else(|| off_grid(max, width))?;
    Ok(Some((lower, upper)))
}

fn off_grid(price: Decimal, width: Decimal) -> BookError {
    BookError::InvalidPrice(format!("{price} has no bin of width {width} within decimal range"))
}

/// Bin edges `(lower, upper, representative)` for one price.
fn bin_edges(price: Decimal, side: Side, span_lower: Decimal, width: Decimal) -> Option<(Decimal, Decimal, Decimal)> {
    let steps = price.checked_sub(span_lower)?.checked_div(width)?;
    match side {
        Side::Bid => {
            let lower = span_lower.checked_add(steps.floor().checked_mul(width)?)?;
            Some((lower, lower.checked_add(width)?, lower))
        }
        Side::Offer => {
            let upper = span_lower.checked_add(steps.ceil().checked_mul(width)?)?;
            Some((upper.checked_sub(width)?, upper, upper))
        }
    }
}

fn bin_side(levels: &[PriceLevel], side: Side, width: Decimal) -> Result<Vec<AggregationBin>, BookError> {
    let Some((span_lower, span_upper)) = grid_span(levels, width)? else {
        return Ok(Vec::new());
    };

    // representative price → (lower, upper, total)
    let mut bins: BTreeMap<Decimal, (Decimal, Decimal, Decimal)> = BTreeMap::new();
    for level in levels {
        let price = level.price.as_decimal();
        let (lower, upper, representative) =
            bin_edges(price, side, span_lower, width).ok_or_else(|| off_grid(price, width))?;
        debug_assert!(span_lower <= lower && upper <= span_upper);

        let quantity = level.quantity.as_decimal();
        let total = bins
            .get(&representative)
            .map_or(Some(quantity), |bin| bin.2.checked_add(quantity))
            .ok_or_else(|| {
                BookError::InvalidQuantity(format!("bin total at {representative} exceeds decimal range"))
            })?;
        bins.insert(representative, (lower, upper, total));
    }

    let live = bins
        .into_iter()
        .filter(|(_, (_, _, total))| *total > Decimal::ZERO);

    // BTreeMap iterates ascending; rank 0 is the bin nearest the midpoint.
    let mut out: Vec<AggregationBin> = match side {
        Side::Bid => live
            .rev()
            .enumerate()
            .map(|(rank, (rep, (lower, upper, total)))| make_bin(side, rank, rep, lower, upper, total))
            .collect(),
        Side::Offer => live
            .enumerate()
            .map(|(rank, (rep, (lower, upper, total)))| make_bin(side, rank, rep, lower, upper, total))
            .collect(),
    };

    if side == Side::Offer {
        out.reverse();
    }
    Ok(out)
}

fn make_bin(
    side: Side,
    rank: usize,
    representative_price: Decimal,
    lower_bound: Decimal,
    upper_bound: Decimal,
    total_quantity: Decimal,
) -> AggregationBin {
    AggregationBin {
        lower_bound,
        upper_bound,
        representative_price,
        total_quantity,
        side,
        rank,
    }
}
