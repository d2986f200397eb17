//! Instrument identifier
//!
//! The mirror tracks exactly one instrument; the identifier is carried on
//! views and checked against incoming feed events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Product identifier (trading pair)
///
/// Format: "BASE-QUOTE" (e.g., "ETH-USD", "BTC-USDC")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create a new ProductId from a string
    ///
    /// # Panics
    /// Panics unless both halves around the '-' are non-empty
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(Self::is_valid(&s), "ProductId must be in BASE-QUOTE format");
        Self(s)
    }

    /// Try to create a ProductId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if Self::is_valid(&s) {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        matches!(s.split_once('-'), Some((base, quote)) if !base.is_empty() && !quote.is_empty())
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_creation() {
        let product = ProductId::new("ETH-USD");
        assert_eq!(product.as_str(), "ETH-USD");
        assert_eq!(product.to_string(), "ETH-USD");
    }

    #[test]
    fn test_product_id_try_new() {
        assert!(ProductId::try_new("ETH-USD").is_some());
        assert!(ProductId::try_new("ETHUSD").is_none());
        assert!(ProductId::try_new("-USD").is_none());
        assert!(ProductId::try_new("ETH-").is_none());
    }

    #[test]
    #[should_panic(expected = "ProductId must be in BASE-QUOTE format")]
    fn test_product_id_invalid_format() {
        ProductId::new("INVALID");
    }

    #[test]
    fn test_product_id_serialization() {
        let product = ProductId::new("BTC-USD");
        let json = serde_json::to_string(&product).unwrap();
        assert_eq!(json, "\"BTC-USD\"");

        let deserialized: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(product, deserialized);
    }
}
