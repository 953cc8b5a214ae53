//! Order persistence boundary.
//!
//! The adjustment engine only needs one read: an order's lines. The trait is
//! deliberately that narrow; order lifecycle writes belong to the order
//! management surface, not to inventory adjustment.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use r#trait::{OrderStore, OrderStoreError};
