//! Book processor: the single writer of the book store
//!
//! ```text
//! raw line ─► FeedMessage ─► SequenceTracker ─► FeedDecoder ─► FeedEvent
//!                                  │ gap                           │
//!                                  ▼                               ▼
//!                             Discontinuity ─────────────►  SharedBook (write)
//!                                                                  │
//!                                            aggregated_view ◄─────┘ (read)
//! ```
//!
//! Each event is applied under one write lock, so readers observe the book
//! either before or after a whole batch.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};
use types::errors::BookError;
use types::ids::ProductId;
use types::level::RawLevel;

use crate::aggregator::{AggregatedView, AggregationConfig};
use crate::config::ServiceConfig;
use crate::events::FeedEvent;
use crate::feed::{FeedDecoder, FeedError, FeedMessage};
use crate::ingestion::{SequenceCheck, SequenceTracker};
use crate::metrics::BookMetrics;
use crate::order_book::{BookStore, BookView};
use crate::sink::{SinkError, ViewSink};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("feed read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Book store behind a reader/writer lock.
///
/// Clones share the same store.
#[derive(Debug, Clone)]
pub struct SharedBook {
    inner: Arc<RwLock<BookStore>>,
}

impl SharedBook {
    pub fn new(product: ProductId) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BookStore::new(product))),
        }
    }

    pub fn initialize(&self, snapshot: &[RawLevel]) -> Result<usize, BookError> {
        self.inner.write().initialize(snapshot)
    }

    pub fn apply_update(&self, batch: &[RawLevel]) -> Result<usize, BookError> {
        self.inner.write().apply_update(batch)
    }

    pub fn reset(&self) {
        self.inner.write().reset();
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_initialized()
    }

    pub fn view(&self) -> Result<BookView, BookError> {
        self.inner.read().view()
    }

    /// Aggregate a consistent view of the book.
    pub fn aggregate(&self, config: &AggregationConfig) -> Result<AggregatedView, BookError> {
        let view = self.view()?;
        config.aggregate(&view)
    }
}

/// What a handled message did to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Snapshot applied; `levels` rest in the book.
    Initialized { levels: usize },
    /// Diff batch of `levels` entries applied.
    Applied { levels: usize },
    /// Book discarded after a discontinuity.
    Reset,
    /// Duplicate or out-of-date message dropped.
    Stale,
}

impl Outcome {
    /// Whether the book content may have changed.
    pub fn changed_book(&self) -> bool {
        matches!(self, Outcome::Initialized { .. } | Outcome::Applied { .. })
    }
}

/// Drives one product's book from the raw feed.
pub struct BookProcessor {
    book: SharedBook,
    decoder: FeedDecoder,
    sequencer: SequenceTracker,
    aggregation: AggregationConfig,
    metrics: Arc<BookMetrics>,
}

impl BookProcessor {
    pub fn new(config: &ServiceConfig) -> Result<Self, BookError> {
        config.validate()?;
        Ok(Self {
            book: SharedBook::new(config.product_id.clone()),
            decoder: FeedDecoder::new(config.channel.clone(), config.product_id.clone()),
            sequencer: SequenceTracker::new(),
            aggregation: config.aggregation()?,
            metrics: Arc::new(BookMetrics::new()),
        })
    }

    /// Handle for concurrent readers.
    pub fn book(&self) -> SharedBook {
        self.book.clone()
    }

    pub fn metrics(&self) -> Arc<BookMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn sequencer(&self) -> &SequenceTracker {
        &self.sequencer
    }

    /// Apply one decoded event.
    pub fn handle(&mut self, event: FeedEvent) -> Result<Outcome, BookError> {
        let started = Instant::now();

        match event {
            FeedEvent::Snapshot { levels } => {
                let resting = self.book.initialize(&levels)?;
                self.metrics
                    .record_snapshot(levels.len(), started.elapsed().as_nanos() as u64);
                Ok(Outcome::Initialized { levels: resting })
            }
            FeedEvent::Diff { levels } => {
                let applied = self.book.apply_update(&levels)?;
                self.metrics
                    .record_diff(applied, started.elapsed().as_nanos() as u64);
                Ok(Outcome::Applied { levels: applied })
            }
            FeedEvent::Discontinuity => {
                self.book.reset();
                self.metrics.record_discontinuity();
                Ok(Outcome::Reset)
            }
        }
    }

    /// Parse, sequence and apply one raw feed message.
    ///
    /// Returns `Ok(None)` for messages that do not concern the book. A
    /// sequence gap resets the book before the message itself is handled,
    /// so a diff arriving after a gap fails with `NotInitialized`.
    pub fn handle_message(&mut self, raw: &str) -> Result<Option<Outcome>, ProcessError> {
        self.metrics.record_message();

        let result = self.process(raw);
        if let Err(err) = &result {
            self.metrics.record_rejected();
            warn!(error = %err, "Feed message rejected");
        }
        result
    }

    fn process(&mut self, raw: &str) -> Result<Option<Outcome>, ProcessError> {
        let message = FeedMessage::parse(raw)?;

        if message.channel == self.decoder.channel() && message.is_snapshot() {
            return self.process_snapshot(message);
        }

        match self.sequencer.observe(message.sequence_num) {
            SequenceCheck::Stale => {
                self.metrics.record_stale();
                return Ok(Some(Outcome::Stale));
            }
            SequenceCheck::Gap(gap) => {
                warn!(
                    missing = gap.gap_size(),
                    "Feed discontinuity, discarding book"
                );
                self.handle(FeedEvent::Discontinuity)?;
            }
            SequenceCheck::InOrder | SequenceCheck::Unsequenced => {}
        }

        self.decode_and_handle(message)
    }

    /// The tracker is rebased only once the snapshot is in the book. A
    /// rejected snapshot discards the book.
    fn process_snapshot(&mut self, message: FeedMessage) -> Result<Option<Outcome>, ProcessError> {
        let sequence = message.sequence_num;

        match self.decode_and_handle(message) {
            Ok(outcome) => {
                self.sequencer.rebase(sequence);
                Ok(outcome)
            }
            Err(err) => {
                warn!(sequence = ?sequence, "Snapshot rejected, discarding book");
                self.handle(FeedEvent::Discontinuity)?;
                Err(err)
            }
        }
    }

    fn decode_and_handle(&mut self, message: FeedMessage) -> Result<Option<Outcome>, ProcessError> {
        let Some(event) = self.decoder.decode(message)? else {
            self.metrics.record_ignored();
            return Ok(None);
        };

        debug!(
            event_type = event.event_type_label(),
            levels = event.level_count(),
            "Handling feed event"
        );
        Ok(Some(self.handle(event)?))
    }

    /// Current book aggregated with the configured bin width and depth.
    pub fn aggregated_view(&self) -> Result<AggregatedView, BookError> {
        let started = Instant::now();
        let view = self.book.aggregate(&self.aggregation)?;
        self.metrics
            .record_aggregation(started.elapsed().as_nanos() as u64);
        Ok(view)
    }
}

/// Totals from a `run_lines` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub rejected: u64,
    pub published: u64,
    /// Book changes whose view could not be aggregated.
    pub unpublished: u64,
}

/// Feed newline-delimited raw messages through the processor, publishing a
/// fresh aggregated view after every message that changed the book.
///
/// Rejected messages and failed aggregations are logged and skipped; read
/// and sink failures end the run.
pub async fn run_lines<R, S>(
    reader: R,
    processor: &mut BookProcessor,
    sink: &mut S,
) -> Result<RunSummary, ProcessError>
where
    R: AsyncBufRead + Unpin,
    S: ViewSink,
{
    let mut lines = reader.lines();
    let mut summary = RunSummary::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        match processor.handle_message(&line) {
            Ok(Some(outcome)) if outcome.changed_book() => match processor.aggregated_view() {
                Ok(view) => {
                    sink.publish(&view)?;
                    summary.published += 1;
                }
                Err(err) => {
                    warn!(error = %err, "Aggregation failed, view not published");
                    summary.unpublished += 1;
                }
            },
            Ok(_) => {}
            Err(_) => summary.rejected += 1,
        }
    }

    info!(
        lines = summary.lines,
        rejected = summary.rejected,
        published = summary.published,
        unpublished = summary.unpublished,
        "Feed exhausted"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use rust_decimal::Decimal;
    use types::side::Side;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn processor() -> BookProcessor {
        BookProcessor::new(&ServiceConfig::default()).unwrap()
    }

    fn message(seq: u64, kind: &str, updates: &str) -> String {
        format!(
            r#"{{"channel":"l2_data","sequence_num":{seq},"events":[{{"type":"{kind}","product_id":"ETH-USD","updates":[{updates}]}}]}}"#
        )
    }

    const SNAP: &str = r#"{"side":"bid","px":"100.0","qty":"2"},{"side":"offer","px":"100.2","qty":"1"}"#;

    #[test]
    fn test_handle_dispatch() {
        let mut p = processor();

        let outcome = p
            .handle(FeedEvent::Snapshot {
                levels: vec![RawLevel::bid(dec("100"), dec("1"))],
            })
            .unwrap();
        assert_eq!(outcome, Outcome::Initialized { levels: 1 });

        let outcome = p
            .handle(FeedEvent::Diff {
                levels: vec![RawLevel::bid(dec("99"), dec("1"))],
            })
            .unwrap();
        assert_eq!(outcome, Outcome::Applied { levels: 1 });

        assert_eq!(p.handle(FeedEvent::Discontinuity).unwrap(), Outcome::Reset);
        assert!(!p.book().is_initialized());
    }

    #[test]
    fn test_diff_before_snapshot_rejected() {
        let mut p = processor();
        let err = p
            .handle_message(&message(1, "update", r#"{"side":"bid","px":"1","qty":"1"}"#))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Book(BookError::NotInitialized)));
        assert_eq!(p.metrics().export()["messages_rejected"], 1);
    }

    #[test]
    fn test_message_flow() {
        let mut p = processor();

        assert_eq!(
            p.handle_message(&message(1, "snapshot", SNAP)).unwrap(),
            Some(Outcome::Initialized { levels: 2 })
        );
        assert_eq!(
            p.handle_message(&message(2, "update", r#"{"side":"bid","px":"100.0","qty":"0"}"#))
                .unwrap(),
            Some(Outcome::Applied { levels: 1 })
        );

        let view = p.book().view().unwrap();
        assert!(view.bids.is_empty());
        assert_eq!(view.offers.len(), 1);
    }

    #[test]
    fn test_stale_message_dropped() {
        let mut p = processor();
        p.handle_message(&message(5, "snapshot", SNAP)).unwrap();

        let outcome = p
            .handle_message(&message(5, "update", r#"{"side":"bid","px":"100.0","qty":"9"}"#))
            .unwrap();
        assert_eq!(outcome, Some(Outcome::Stale));
        assert_eq!(p.book().view().unwrap().bids[0].quantity.as_decimal(), dec("2"));
    }

    #[test]
    fn test_gap_resets_book() {
        let mut p = processor();
        p.handle_message(&message(1, "snapshot", SNAP)).unwrap();

        let err = p
            .handle_message(&message(4, "update", r#"{"side":"bid","px":"99.9","qty":"1"}"#))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Book(BookError::NotInitialized)));
        assert!(!p.book().is_initialized());
        assert_eq!(p.metrics().export()["discontinuities"], 1);

        // A fresh snapshot recovers the book
        assert_eq!(
            p.handle_message(&message(9, "snapshot", SNAP)).unwrap(),
            Some(Outcome::Initialized { levels: 2 })
        );
    }

    #[test]
    fn test_rejected_snapshot_discards_book() {
        let mut p = processor();
        p.handle_message(&message(1, "snapshot", r#"{"side":"bid","px":"100","qty":"2"}"#))
            .unwrap();

        let err = p
            .handle_message(&message(
                50,
                "snapshot",
                r#"{"side":"bid","px":"101","qty":"1"},{"side":"buy","px":"102","qty":"1"}"#,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Book(BookError::MalformedLevel { .. })
        ));
        assert!(!p.book().is_initialized());
        assert_eq!(p.sequencer().last_sequence(), Some(1));

        // The next diff must not land on the earlier snapshot
        let err = p
            .handle_message(&message(51, "update", r#"{"side":"bid","px":"200","qty":"3"}"#))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Book(BookError::NotInitialized)));
        assert!(p.book().view().is_err());
    }

    #[test]
    fn test_rejected_unsequenced_snapshot_discards_book() {
        let mut p = processor();
        p.handle_message(&message(1, "snapshot", SNAP)).unwrap();

        let wrong_product = r#"{"channel":"l2_data","events":[{"type":"snapshot","product_id":"BTC-USD","updates":[]}]}"#;
        assert!(matches!(
            p.handle_message(wrong_product),
            Err(ProcessError::Feed(FeedError::ProductMismatch { .. }))
        ));

        let diff = r#"{"channel":"l2_data","events":[{"type":"update","product_id":"ETH-USD","updates":[{"side":"bid","px":"99","qty":"1"}]}]}"#;
        assert!(matches!(
            p.handle_message(diff),
            Err(ProcessError::Book(BookError::NotInitialized))
        ));
    }

    #[test]
    fn test_other_channel_ignored() {
        let mut p = processor();
        let outcome = p
            .handle_message(r#"{"channel":"heartbeats","sequence_num":1}"#)
            .unwrap();
        assert_eq!(outcome, None);
        assert_eq!(p.metrics().export()["messages_ignored"], 1);
    }

    #[test]
    fn test_malformed_side_leaves_book_untouched() {
        let mut p = processor();
        p.handle_message(&message(1, "snapshot", SNAP)).unwrap();
        let before = p.book().view().unwrap();

        let err = p
            .handle_message(&message(
                2,
                "update",
                r#"{"side":"bid","px":"100.0","qty":"7"},{"side":"ask","px":"100.3","qty":"1"}"#,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Book(BookError::MalformedLevel { .. })
        ));
        assert_eq!(p.book().view().unwrap(), before);
    }

    #[test]
    fn test_aggregated_view_uses_config() {
        let mut p = processor();
        assert!(matches!(
            p.aggregated_view(),
            Err(BookError::NotInitialized)
        ));

        p.handle_message(&message(
            1,
            "snapshot",
            r#"{"side":"bid","px":"100.05","qty":"2"},{"side":"bid","px":"100.01","qty":"1"}"#,
        ))
        .unwrap();

        let view = p.aggregated_view().unwrap();
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.total_quantity(Side::Bid), dec("3"));
        assert_eq!(p.metrics().export()["aggregations"], 1);
    }

    #[test]
    fn test_readers_never_see_partial_batch() {
        let mut p = processor();
        p.handle(FeedEvent::Snapshot {
            levels: vec![
                RawLevel::bid(dec("100"), dec("1")),
                RawLevel::bid(dec("99"), dec("1")),
            ],
        })
        .unwrap();

        let book = p.book();
        let reader = std::thread::spawn(move || {
            for _ in 0..2_000 {
                let view = book.view().unwrap();
                let quantities: Vec<Decimal> =
                    view.bids.iter().map(|l| l.quantity.as_decimal()).collect();
                // Both levels always move together
                assert_eq!(quantities.len(), 2);
                assert_eq!(quantities[0], quantities[1]);
            }
        });

        for i in 2..500u64 {
            let qty = Decimal::from(i);
            p.handle(FeedEvent::Diff {
                levels: vec![RawLevel::bid(dec("100"), qty), RawLevel::bid(dec("99"), qty)],
            })
            .unwrap();
        }

        reader.join().unwrap();
    }

    #[test]
    fn test_unbinnable_price_fails_aggregation_only() {
        let mut p = processor();
        p.handle_message(&message(
            1,
            "snapshot",
            r#"{"side":"bid","px":"10000000000000000000000000000","qty":"1"}"#,
        ))
        .unwrap();

        assert!(matches!(
            p.aggregated_view(),
            Err(BookError::InvalidPrice(_))
        ));

        // Removing the level makes the book aggregatable again
        p.handle_message(&message(
            2,
            "update",
            r#"{"side":"bid","px":"10000000000000000000000000000","qty":"0"},{"side":"bid","px":"100","qty":"1"}"#,
        ))
        .unwrap();
        assert_eq!(p.aggregated_view().unwrap().bids.len(), 1);
    }

    #[tokio::test]
    async fn test_run_lines_skips_unbinnable_views() {
        let transcript = [
            message(1, "snapshot", r#"{"side":"offer","px":"10000000000000000000000000000","qty":"1"}"#),
            message(2, "update", r#"{"side":"offer","px":"10000000000000000000000000000","qty":"0"}"#),
        ]
        .join("\n");

        let mut p = processor();
        let mut sink = MemorySink::new();
        let summary = run_lines(transcript.as_bytes(), &mut p, &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.unpublished, 1);
        assert_eq!(summary.published, 1);
        assert!(sink.latest().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_lines_publishes_on_change() {
        let transcript = [
            message(1, "snapshot", SNAP),
            r#"{"channel":"heartbeats","sequence_num":2}"#.to_string(),
            message(3, "update", r#"{"side":"offer","px":"100.3","qty":"4"}"#),
            "not json".to_string(),
            String::new(),
            message(4, "update", r#"{"side":"offer","px":"100.3","qty":"0"}"#),
        ]
        .join("\n");

        let mut p = processor();
        let mut sink = MemorySink::new();
        let summary = run_lines(transcript.as_bytes(), &mut p, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                lines: 5,
                rejected: 1,
                published: 3,
                unpublished: 0,
            }
        );
        assert_eq!(sink.published(), 3);
        let latest = sink.latest().unwrap();
        assert_eq!(latest.offers.len(), 1);
        assert_eq!(latest.total_quantity(Side::Offer), dec("1"));
    }
}
