//! Book side
//!
//! The feed tags every level `bid` or `offer`. Any other tag is a malformed
//! level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BookError;

/// Side of the book a level rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest
    Bid,
    /// Resting sell interest
    Offer,
}

impl Side {
    /// Wire tag as sent by the feed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Offer => "offer",
        }
    }

    /// Suffix used in display row identifiers (`0_bid`, `3_ask`).
    pub fn row_suffix(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Offer => "ask",
        }
    }
}

impl FromStr for Side {
    type Err = BookError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "bid" => Ok(Side::Bid),
            "offer" => Ok(Side::Offer),
            other => Err(BookError::MalformedLevel {
                tag: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
