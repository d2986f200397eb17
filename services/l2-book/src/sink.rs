//! Publishing aggregated views to consumers
//!
//! The processor hands every fresh `AggregatedView` to a `ViewSink`. A sink
//! that renders for a dashboard uses `DisplayFrame`: the headline plus the
//! display window, one row per bin, keyed by row id.

use std::io::Write;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::ProductId;
use types::side::Side;

use crate::aggregator::{AggregatedView, AggregationBin};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("view serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Consumer of aggregated views.
pub trait ViewSink {
    fn publish(&mut self, view: &AggregatedView) -> Result<(), SinkError>;
}

/// One row of the display table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub id: String,
    pub px: Decimal,
    pub qty: Decimal,
    pub side: Side,
}

impl From<&AggregationBin> for DisplayRow {
    fn from(bin: &AggregationBin) -> Self {
        Self {
            id: bin.row_id(),
            px: bin.representative_price,
            qty: bin.total_quantity,
            side: bin.side,
        }
    }
}

/// What a dashboard shows for one view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFrame {
    pub product: ProductId,
    pub headline: String,
    /// Price descending.
    pub rows: Vec<DisplayRow>,
}

impl DisplayFrame {
    pub fn from_view(product: &ProductId, view: &AggregatedView, row_count: usize) -> Self {
        Self {
            product: product.clone(),
            headline: view.headline(product.as_str()),
            rows: view
                .display_window(row_count)
                .into_iter()
                .map(DisplayRow::from)
                .collect(),
        }
    }
}

/// Keeps the most recent view in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    latest: Option<AggregatedView>,
    published: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&AggregatedView> {
        self.latest.as_ref()
    }

    /// Number of views published so far.
    pub fn published(&self) -> usize {
        self.published
    }
}

impl ViewSink for MemorySink {
    fn publish(&mut self, view: &AggregatedView) -> Result<(), SinkError> {
        self.latest = Some(view.clone());
        self.published += 1;
        Ok(())
    }
}

/// Writes one `DisplayFrame` per view as a JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    product: ProductId,
    row_count: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, product: ProductId, row_count: usize) -> Self {
        Self {
            writer,
            product,
            row_count,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ViewSink for JsonLinesSink<W> {
    fn publish(&mut self, view: &AggregatedView) -> Result<(), SinkError> {
        let frame = DisplayFrame::from_view(&self.product, view, self.row_count);
        serde_json::to_writer(&mut self.writer, &frame)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
