//! Decoded feed events consumed by the book processor
//!
//! The feed adapter turns each wire message into at most one `FeedEvent`.
//! Levels stay raw (`RawLevel`) until the book store validates the batch.

use serde::{Deserialize, Serialize};
use types::level::RawLevel;

/// A decoded event handed to the book processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum FeedEvent {
    /// Full book state; replaces whatever the store holds.
    Snapshot { levels: Vec<RawLevel> },

    /// Ordered batch of absolute level quantities.
    Diff { levels: Vec<RawLevel> },

    /// Continuity was lost; the book must wait for the next snapshot.
    Discontinuity,
}

impl FeedEvent {
    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            FeedEvent::Snapshot { .. } => "Snapshot",
            FeedEvent::Diff { .. } => "Diff",
            FeedEvent::Discontinuity => "Discontinuity",
        }
    }

    /// Number of levels carried by the event.
    pub fn level_count(&self) -> usize {
        match self {
            FeedEvent::Snapshot { levels } | FeedEvent::Diff { levels } => levels.len(),
            FeedEvent::Discontinuity => 0,
        }
    }
}
