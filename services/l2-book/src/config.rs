//! Service configuration
//!
//! Loaded from `L2_*` environment variables; every setting has a default
//! matching the venue's ETH-USD display book.

use std::env;

use rust_decimal::Decimal;
use types::errors::BookError;
use types::ids::ProductId;

use crate::aggregator::AggregationConfig;

pub const DEFAULT_PRODUCT_ID: &str = "ETH-USD";
pub const DEFAULT_CHANNEL: &str = "l2_data";
pub const DEFAULT_AGG_LEVEL: &str = "0.1";
pub const DEFAULT_DEPTH_LIMIT: usize = 300;
pub const DEFAULT_ROW_COUNT: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub product_id: ProductId,
    /// Feed channel carrying book events.
    pub channel: String,
    /// Display bin width.
    pub agg_level: Decimal,
    /// Raw levels per side fed into aggregation; `None` is unbounded.
    pub depth_limit: Option<usize>,
    /// Rows in the display window.
    pub row_count: usize,
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, BookError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BookError> {
        let product = lookup("L2_PRODUCT_ID").unwrap_or_else(|| DEFAULT_PRODUCT_ID.to_string());
        let product_id = ProductId::try_new(product.clone())
            .ok_or_else(|| BookError::invalid_config(format!("L2_PRODUCT_ID {product:?} is not BASE-QUOTE")))?;

        let channel = lookup("L2_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

        let agg = lookup("L2_AGG_LEVEL").unwrap_or_else(|| DEFAULT_AGG_LEVEL.to_string());
        let agg_level = Decimal::from_str_exact(agg.trim())
            .map_err(|_| BookError::invalid_config(format!("L2_AGG_LEVEL {agg:?} is not a decimal")))?;

        let depth_limit = match lookup("L2_DEPTH_LIMIT") {
            Some(raw) => match parse_usize("L2_DEPTH_LIMIT", &raw)? {
                0 => None,
                n => Some(n),
            },
            None => Some(DEFAULT_DEPTH_LIMIT),
        };

        let row_count = match lookup("L2_ROW_COUNT") {
            Some(raw) => parse_usize("L2_ROW_COUNT", &raw)?,
            None => DEFAULT_ROW_COUNT,
        };

        let config = Self {
            product_id,
            channel,
            agg_level,
            depth_limit,
            row_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the processor cannot run with.
    pub fn validate(&self) -> Result<(), BookError> {
        if self.agg_level <= Decimal::ZERO {
            return Err(BookError::invalid_config(format!(
                "agg level must be positive, got {}",
                self.agg_level
            )));
        }
        if self.row_count == 0 {
            return Err(BookError::invalid_config("row count must be at least 1"));
        }
        if self.channel.is_empty() {
            return Err(BookError::invalid_config("channel must not be empty"));
        }
        Ok(())
    }

    /// Aggregation parameters derived from this configuration.
    pub fn aggregation(&self) -> Result<AggregationConfig, BookError> {
        AggregationConfig::new(self.agg_level, self.depth_limit)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            product_id: ProductId::new(DEFAULT_PRODUCT_ID),
            channel: DEFAULT_CHANNEL.to_string(),
            agg_level: Decimal::new(1, 1),
            depth_limit: Some(DEFAULT_DEPTH_LIMIT),
            row_count: DEFAULT_ROW_COUNT,
        }
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, BookError> {
    raw.trim()
        .parse()
        .map_err(|_| BookError::invalid_config(format!("{key} {raw:?} is not a non-negative integer")))
}
