//! Sequence tracking for the feed connection
//!
//! Every envelope on the connection carries a `sequence_num`. The tracker
//! enforces the connection's continuity invariants:
//! - Duplicate or stale numbers are dropped
//! - A jump ahead means messages were lost; the book must be rebuilt
//! - A snapshot rebases the expected sequence

use tracing::{debug, warn};

/// Range of sequence numbers that never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// First missing sequence number (inclusive)
    pub from_sequence: u64,
    /// Last missing sequence number (inclusive)
    pub to_sequence: u64,
}

impl SequenceGap {
    /// Number of messages missing in this gap.
    pub fn gap_size(&self) -> u64 {
        self.to_sequence - self.from_sequence + 1
    }
}

/// Verdict on a single envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Next in line, or the first message seen.
    InOrder,
    /// Already seen or older than the last accepted message.
    Stale,
    /// Messages were lost before this one.
    Gap(SequenceGap),
    /// Envelope carried no sequence number.
    Unsequenced,
}

/// Tracks envelope sequence numbers and flags loss of continuity.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    /// Last accepted sequence number.
    last_sequence: Option<u64>,
    /// Total envelopes accepted in order (gaps included).
    accepted: u64,
    /// Total duplicate or stale envelopes dropped.
    dropped: u64,
    /// Total gaps detected.
    gaps_detected: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a regular envelope against the expected sequence.
    ///
    /// Stale envelopes do not move the tracker; gaps do, so the next
    /// envelope is judged against the one that revealed the gap.
    pub fn observe(&mut self, sequence: Option<u64>) -> SequenceCheck {
        let Some(seq) = sequence else {
            return SequenceCheck::Unsequenced;
        };

        if self.last_sequence.is_some_and(|last| seq <= last) {
            self.dropped += 1;
            debug!(sequence = seq, last = ?self.last_sequence, "Dropping stale envelope");
            return SequenceCheck::Stale;
        }

        let gap = self.detect_gap(seq);
        self.record(seq);

        match gap {
            Some(gap) => {
                self.gaps_detected += 1;
                warn!(
                    from = gap.from_sequence,
                    to = gap.to_sequence,
                    gap_size = gap.gap_size(),
                    "Sequence gap detected"
                );
                SequenceCheck::Gap(gap)
            }
            None => SequenceCheck::InOrder,
        }
    }

    /// Accept a snapshot envelope unconditionally and restart tracking
    /// from its sequence number.
    pub fn rebase(&mut self, sequence: Option<u64>) {
        self.last_sequence = None;
        if let Some(seq) = sequence {
            self.record(seq);
        }
    }

    /// Last accepted sequence number, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }

    fn record(&mut self, seq: u64) {
        self.last_sequence = Some(seq);
        self.accepted += 1;
    }

    fn detect_gap(&self, incoming: u64) -> Option<SequenceGap> {
        let expected = self.last_sequence? + 1;
        (incoming > expected).then(|| SequenceGap {
            from_sequence: expected,
            to_sequence: incoming - 1,
        })
    }
}
