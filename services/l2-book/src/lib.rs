//! Level-2 Book Service
//!
//! Mirrors one product's L2 order book from the venue feed and produces:
//! - A sorted in-memory book (snapshot + absolute-quantity diffs)
//! - Fixed-width price bins for display, ranked from the midpoint
//! - Display frames (headline + row window) for downstream consumers
//!
//! # Architecture
//!
//! ```text
//!   Venue feed (JSON lines)
//!          │
//!     ┌────▼────┐
//!     │  Feed   │  ← Envelope decoding, channel/product filtering
//!     └────┬────┘
//!          │
//!     ┌────▼────┐
//!     │Sequence │  ← Stale drop, gap → discontinuity
//!     └────┬────┘
//!          │
//!     ┌────▼────┐
//!     │  Book   │  ← Single writer, RwLock-shared
//!     └────┬────┘
//!          │
//!   ┌──────▼──────┐
//!   │ Aggregator  │  ← Bins per side
//!   └──────┬──────┘
//!          │
//!     ┌────▼────┐
//!     │  Sink   │
//!     └─────────┘
//! ```

pub mod aggregator;
pub mod config;
pub mod events;
pub mod feed;
pub mod ingestion;
pub mod metrics;
pub mod order_book;
pub mod processor;
pub mod sink;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
