use std::sync::Arc;

use thiserror::Error;

use atelier_core::ProductId;

/// Queryable stock row: current quantity per product.
///
/// Projection built field-by-field at the repository boundary; no reflective
/// entity mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
}

/// Stock store operation error.
///
/// `ProductNotFound` is a business-visible condition (a line referencing a
/// product with no stock row); `Storage` is a transient infrastructure
/// failure, safe to retry at the engine-call level.
#[derive(Debug, Error)]
pub enum StockStoreError {
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("stock storage unavailable: {0}")]
    Storage(String),
}

/// Guarded, single-row stock mutation.
///
/// Implementations must make each operation atomic per product row:
/// a conditional decrement either observes sufficient stock and applies, or
/// declines without mutating. Nothing here spans rows; all-or-nothing
/// semantics across an order's products is explicitly out of this trait's
/// contract.
///
/// Quantities are non-negative. A zero-quantity mutation verifies the product
/// exists and is otherwise a no-op success.
pub trait StockStore: Send + Sync {
    /// Atomically decrement stock by `quantity` only if current stock is at
    /// least `quantity`. Returns whether the mutation happened. Stock never
    /// goes negative.
    fn try_decrease(&self, product_id: ProductId, quantity: i64) -> Result<bool, StockStoreError>;

    /// Atomically increment stock by `quantity`. Always succeeds for a known
    /// product.
    fn increase(&self, product_id: ProductId, quantity: i64) -> Result<(), StockStoreError>;

    /// Current stock quantity for a product.
    fn stock(&self, product_id: ProductId) -> Result<i64, StockStoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn try_decrease(&self, product_id: ProductId, quantity: i64) -> Result<bool, StockStoreError> {
        (**self).try_decrease(product_id, quantity)
    }

    fn increase(&self, product_id: ProductId, quantity: i64) -> Result<(), StockStoreError> {
        (**self).increase(product_id, quantity)
    }

    fn stock(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        (**self).stock(product_id)
    }
}
