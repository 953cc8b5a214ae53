//! Idempotency ledger boundary.
//!
//! The ledger is what turns "guarded decrement" into "guarded decrement,
//! applied exactly once per (order, direction)". Its atomic insert-if-absent
//! is the sole serialization point for an adjustment key: one winner proceeds
//! to mutate stock, every other concurrent or later caller is answered from
//! the recorded entry.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryAdjustmentLedger;
pub use postgres::PostgresAdjustmentLedger;
pub use r#trait::{AdjustmentHistory, AdjustmentLedger, LedgerError, LedgerInsert, LedgerReservation};
