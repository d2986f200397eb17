//! Types library for the L2 book mirror
//!
//! Shared type definitions used by the book store, the aggregator and the
//! feed adapter.
//!
//! # Modules
//! - `ids`: Instrument identifier (ProductId)
//! - `numeric`: Decimal newtypes (Price, Quantity)
//! - `side`: Book side (bid / offer)
//! - `level`: Raw wire levels and validated price levels
//! - `errors`: Error taxonomy

pub mod errors;
pub mod ids;
pub mod level;
pub mod numeric;
pub mod side;
