//! In-memory L2 book store
//!
//! Mirrors the venue's aggregated book for a single product.
//! Uses `BTreeMap` keyed by price for deterministic sorted iteration.
//! All arithmetic uses `Decimal`.
//!
//! The store processes:
//! - `initialize` → replace both sides from a snapshot
//! - `apply_update` → fold a diff batch (absolute quantities), then prune
//! - `reset` → drop state after a feed discontinuity
//!
//! Every batch is validated in full before the maps are touched, so a
//! malformed level leaves the previous state intact.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use types::errors::BookError;
use types::ids::ProductId;
use types::level::{parse_batch, PriceLevel, RawLevel};
use types::numeric::{Price, Quantity};
use types::side::Side;

/// L2 book state for a single product.
///
/// Bids read back in descending price order (best bid first).
/// Offers read back in ascending price order (best offer first).
#[derive(Debug, Clone)]
pub struct BookStore {
    /// Product this book mirrors.
    pub product: ProductId,
    /// Bid levels: price → quantity (BTreeMap sorts ascending, reversed on read).
    bids: BTreeMap<Price, Quantity>,
    /// Offer levels: price → quantity (ascending = best offer first).
    offers: BTreeMap<Price, Quantity>,
    /// Whether a snapshot has been applied since creation or the last reset.
    initialized: bool,
}

impl BookStore {
    /// Create an empty, uninitialized book for the given product.
    pub fn new(product: ProductId) -> Self {
        Self {
            product,
            bids: BTreeMap::new(),
            offers: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Replace the whole book from a snapshot.
    ///
    /// Zero-quantity snapshot entries are not stored. Returns the number of
    /// levels resting after the snapshot.
    pub fn initialize(&mut self, snapshot: &[RawLevel]) -> Result<usize, BookError> {
        let levels = parse_batch(snapshot)?;

        let mut bids = BTreeMap::new();
        let mut offers = BTreeMap::new();
        for level in &levels {
            let quantity = level.quantity.abs();
            if quantity.is_zero() {
                continue;
            }
            let side = match level.side {
                Side::Bid => &mut bids,
                Side::Offer => &mut offers,
            };
            side.insert(level.price, quantity);
        }

        self.bids = bids;
        self.offers = offers;
        self.initialized = true;

        info!(
            product = %self.product,
            bid_levels = self.bids.len(),
            offer_levels = self.offers.len(),
            "Book initialized from snapshot"
        );

        Ok(self.bids.len() + self.offers.len())
    }

    /// Apply a diff batch.
    ///
    /// Each entry replaces the resting quantity at its price (last write
    /// wins within the batch); unknown prices with zero quantity are
    /// ignored. Empty levels are pruned only once the whole batch is in.
    /// Returns the number of entries applied.
    pub fn apply_update(&mut self, batch: &[RawLevel]) -> Result<usize, BookError> {
        if !self.initialized {
            return Err(BookError::NotInitialized);
        }

        let levels = parse_batch(batch)?;
        for level in &levels {
            self.apply_level(level);
        }
        let pruned = self.prune();

        debug!(
            product = %self.product,
            applied = levels.len(),
            pruned,
            bid_levels = self.bids.len(),
            offer_levels = self.offers.len(),
            "Diff batch applied"
        );

        Ok(levels.len())
    }

    /// Drop all state. The book rejects diffs until the next snapshot.
    pub fn reset(&mut self) {
        self.bids.clear();
        self.offers.clear();
        self.initialized = false;
        info!(product = %self.product, "Book reset, awaiting snapshot");
    }

    /// Whether a snapshot has been applied.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Point-in-time sorted view of both sides.
    pub fn view(&self) -> Result<BookView, BookError> {
        if !self.initialized {
            return Err(BookError::NotInitialized);
        }

        Ok(BookView {
            product: self.product.clone(),
            bids: self.bid_levels(),
            offers: self.offer_levels(),
        })
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of offer price levels.
    pub fn offer_depth(&self) -> usize {
        self.offers.len()
    }

    /// Resting quantity at a price, if the level exists.
    pub fn quantity_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        let price = Price::try_new(price)?;
        let levels = match side {
            Side::Bid => &self.bids,
            Side::Offer => &self.offers,
        };
        levels.get(&price).map(Quantity::as_decimal)
    }

    /// Get all bid levels (descending price order).
    fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .rev()
            .map(|(price, qty)| PriceLevel::new(Side::Bid, *price, *qty))
            .collect()
    }

    /// Get all offer levels (ascending price order).
    fn offer_levels(&self) -> Vec<PriceLevel> {
        self.offers
            .iter()
            .map(|(price, qty)| PriceLevel::new(Side::Offer, *price, *qty))
            .collect()
    }

    fn apply_level(&mut self, level: &PriceLevel) {
        let levels = match level.side {
            Side::Bid => &mut self.bids,
            Side::Offer => &mut self.offers,
        };
        let quantity = level.quantity.abs();

        if let Some(resting) = levels.get_mut(&level.price) {
            *resting = quantity;
        } else if !quantity.is_zero() {
            levels.insert(level.price, quantity);
        }
    }

    /// Remove all price levels with no remaining quantity.
    fn prune(&mut self) -> usize {
        let before = self.bids.len() + self.offers.len();
        self.bids.retain(|_, qty| !qty.is_zero());
        self.offers.retain(|_, qty| !qty.is_zero());
        before - self.bids.len() - self.offers.len()
    }
}

/// Immutable snapshot of the book at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    pub product: ProductId,
    /// Bids in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Offers in ascending price order (best first).
    pub offers: Vec<PriceLevel>,
}

impl BookView {
    /// Highest bid level.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Lowest offer level.
    pub fn best_offer(&self) -> Option<&PriceLevel> {
        self.offers.first()
    }

    /// Get the mid-market price (average of best bid and best offer).
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price.as_decimal();
        let offer = self.best_offer()?.price.as_decimal();
        // Halve first so prices near the decimal limit do not overflow
        Some(bid / Decimal::TWO + offer / Decimal::TWO)
    }

    /// Get the spread between best offer and best bid.
    ///
    /// Negative when the feed delivers a crossed book.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_offer()) {
            (Some(bid), Some(offer)) => Some(offer.price.as_decimal() - bid.price.as_decimal()),
            _ => None,
        }
    }

    /// Levels of one side, best first.
    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Offer => &self.offers,
        }
    }

    /// SHA-256 over the sorted levels of both sides.
    ///
    /// Values are normalized first, so `100.1` and `100.10` hash alike.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();

        for levels in [&self.bids, &self.offers] {
            for level in levels {
                hasher.update(level.price.as_decimal().normalize().to_string().as_bytes());
                hasher.update(b":");
                hasher.update(level.quantity.as_decimal().normalize().to_string().as_bytes());
                hasher.update(b"|");
            }
            hasher.update(b"---");
        }

        format!("{:x}", hasher.finalize())
    }
}
