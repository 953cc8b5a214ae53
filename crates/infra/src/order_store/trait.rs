use std::sync::Arc;

use thiserror::Error;

use atelier_core::OrderId;
use atelier_orders::OrderLine;

/// Order store operation error.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// The order id does not resolve to an existing order.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Transient infrastructure failure; safe to retry the engine call.
    #[error("order storage unavailable: {0}")]
    Storage(String),
}

/// Read access to an order's line items.
pub trait OrderStore: Send + Sync {
    /// All lines of the order, regardless of any line-level status.
    ///
    /// An order with no lines yields an empty vector, not an error;
    /// `OrderNotFound` is reserved for ids with no order at all.
    fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderStoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderStoreError> {
        (**self).order_lines(order_id)
    }
}
