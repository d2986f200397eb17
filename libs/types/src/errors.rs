//! Error types for the book store and aggregator
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Errors raised by book mutations, reads and aggregation.
///
/// All variants are fatal to the call that produced them, never to the
/// process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// A level carried a side tag other than `bid` or `offer`.
    #[error("Malformed level: unrecognized side tag {tag:?}")]
    MalformedLevel { tag: String },

    /// A diff or read was requested before any snapshot was applied.
    #[error("Book not initialized: a snapshot must be applied first")]
    NotInitialized,

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

impl BookError {
    /// Shorthand for an `InvalidConfiguration` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BookError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_level_display() {
        let err = BookError::MalformedLevel {
            tag: "ask".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed level: unrecognized side tag \"ask\""
        );
    }

    #[test]
    fn test_invalid_config_helper() {
        let err = BookError::invalid_config("bin width must be positive");
        assert!(matches!(err, BookError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("bin width"));
    }

    #[test]
    fn test_not_initialized_display() {
        assert!(BookError::NotInitialized.to_string().contains("snapshot"));
    }
}
