//! Per-product stock storage boundary.
//!
//! This module defines an infrastructure-facing abstraction for guarded stock
//! mutation without making any storage assumptions. Conditional single-row
//! operations live here; cross-row coordination belongs to the engine.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use r#trait::{ProductRecord, StockStore, StockStoreError};
