//! Wire decoding for the venue's `l2_data` channel
//!
//! Message shape:
//!
//! ```text
//! {"channel": "l2_data", "timestamp": "...", "sequence_num": 12,
//!  "events": [{"type": "snapshot" | "update", "product_id": "ETH-USD",
//!              "updates": [{"side": "bid", "event_time": "...", "px": "...", "qty": "..."}]}]}
//! ```
//!
//! A message whose first event is a snapshot decodes to `FeedEvent::Snapshot`;
//! any other message on the channel folds all of its updates, in order, into
//! one `FeedEvent::Diff`.

use serde::Deserialize;
use tracing::debug;
use types::ids::ProductId;
use types::level::RawLevel;

use crate::events::FeedEvent;

/// Errors raised while decoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event type {0:?}")]
    UnknownEventType(String),

    #[error("event for product {actual} on a feed for {expected}")]
    ProductMismatch { expected: ProductId, actual: String },
}

/// Top-level envelope shared by every channel on the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedMessage {
    pub channel: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sequence_num: Option<u64>,
    /// Kept opaque until the channel is known; other channels carry
    /// differently shaped events.
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

/// One entry of the envelope's `events` array.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub updates: Vec<RawLevel>,
}

impl FeedMessage {
    /// Parse the envelope without interpreting its events.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the first event is a snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.events
            .first()
            .and_then(|e| e.get("type"))
            .and_then(|kind| kind.as_str())
            == Some("snapshot")
    }
}

/// Turns envelopes from one channel into book events for one product.
#[derive(Debug, Clone)]
pub struct FeedDecoder {
    channel: String,
    product: ProductId,
}

impl FeedDecoder {
    pub fn new(channel: impl Into<String>, product: ProductId) -> Self {
        Self {
            channel: channel.into(),
            product,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Interpret an envelope.
    ///
    /// Returns `Ok(None)` for messages on other channels and for messages
    /// without events.
    pub fn decode(&self, message: FeedMessage) -> Result<Option<FeedEvent>, FeedError> {
        if message.channel != self.channel {
            debug!(channel = %message.channel, "Ignoring message on other channel");
            return Ok(None);
        }
        if message.events.is_empty() {
            return Ok(None);
        }

        let snapshot = message.is_snapshot();
        let events = message
            .events
            .into_iter()
            .map(serde_json::from_value::<WireEvent>)
            .collect::<Result<Vec<_>, _>>()?;

        for event in &events {
            if event.kind != "snapshot" && event.kind != "update" {
                return Err(FeedError::UnknownEventType(event.kind.clone()));
            }
            if let Some(product) = &event.product_id {
                if product != self.product.as_str() {
                    return Err(FeedError::ProductMismatch {
                        expected: self.product.clone(),
                        actual: product.clone(),
                    });
                }
            }
        }

        let mut events = events.into_iter();

        let feed_event = if snapshot {
            let levels = events.next().map(|e| e.updates).unwrap_or_default();
            FeedEvent::Snapshot { levels }
        } else {
            FeedEvent::Diff {
                levels: events.flat_map(|e| e.updates).collect(),
            }
        };
        Ok(Some(feed_event))
    }

    /// Parse and interpret a raw message in one step.
    pub fn decode_str(&self, raw: &str) -> Result<Option<FeedEvent>, FeedError> {
        self.decode(FeedMessage::parse(raw)?)
    }
}
