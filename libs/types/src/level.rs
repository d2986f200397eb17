//! Price level types
//!
//! `RawLevel` is a level exactly as the feed adapter decoded it, side tag
//! still a string. `PriceLevel` is the validated form the book store works
//! with.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::BookError;
use crate::numeric::{Price, Quantity};
use crate::side::Side;

/// A level as decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLevel {
    /// Side tag, expected to be `bid` or `offer`.
    pub side: String,
    /// Level price.
    #[serde(rename = "px")]
    pub price: Decimal,
    /// Absolute resting quantity at this price.
    #[serde(rename = "qty")]
    pub quantity: Decimal,
}

impl RawLevel {
    pub fn new(side: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            side: side.into(),
            price,
            quantity,
        }
    }

    pub fn bid(price: Decimal, quantity: Decimal) -> Self {
        Self::new("bid", price, quantity)
    }

    pub fn offer(price: Decimal, quantity: Decimal) -> Self {
        Self::new("offer", price, quantity)
    }
}

/// A validated price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub side: Side,
}

impl PriceLevel {
    pub fn new(side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            price,
            quantity,
            side,
        }
    }
}

impl TryFrom<&RawLevel> for PriceLevel {
    type Error = BookError;

    fn try_from(raw: &RawLevel) -> Result<Self, Self::Error> {
        let side = raw.side.parse::<Side>()?;
        let price = Price::try_from(raw.price)?;
        Ok(Self::new(side, price, Quantity::new(raw.quantity)))
    }
}

/// Validate a whole batch before anything is applied.
///
/// Fails on the first malformed entry, so callers either get every level or
/// none of them.
pub fn parse_batch(levels: &[RawLevel]) -> Result<Vec<PriceLevel>, BookError> {
    levels.iter().map(PriceLevel::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_raw_level_wire_names() {
        let json = r#"{"side":"bid","event_time":"2023-06-01T00:00:00Z","px":"1850.25","qty":"3.5"}"#;
        let raw: RawLevel = serde_json::from_str(json).unwrap();
        assert_eq!(raw, RawLevel::bid(dec("1850.25"), dec("3.5")));
    }

    #[test]
    fn test_parse_valid_level() {
        let level = PriceLevel::try_from(&RawLevel::offer(dec("100.10"), dec("4"))).unwrap();
        assert_eq!(level.side, Side::Offer);
        assert_eq!(level.price.as_decimal(), dec("100.10"));
        assert_eq!(level.quantity.as_decimal(), dec("4"));
    }

    #[test]
    fn test_parse_rejects_unknown_side() {
        let err = PriceLevel::try_from(&RawLevel::new("ask", dec("1"), dec("1"))).unwrap_err();
        assert_eq!(
            err,
            BookError::MalformedLevel {
                tag: "ask".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_positive_price() {
        let err = PriceLevel::try_from(&RawLevel::bid(Decimal::ZERO, dec("1"))).unwrap_err();
        assert!(matches!(err, BookError::InvalidPrice(_)));
    }

    #[test]
    fn test_parse_batch_is_all_or_nothing() {
        let batch = vec![
            RawLevel::bid(dec("100"), dec("1")),
            RawLevel::new("mid", dec("100.5"), dec("1")),
            RawLevel::offer(dec("101"), dec("1")),
        ];
        assert!(parse_batch(&batch).is_err());
        assert_eq!(parse_batch(&batch[..1]).unwrap().len(), 1);
    }
}
