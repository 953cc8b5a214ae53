//! Postgres-backed stock store implementation.
//!
//! Guarded mutation is pushed down to the database: the conditional decrement
//! is a single `UPDATE ... WHERE stock >= $qty`, so the sufficiency check and
//! the mutation are one atomic statement. The `CHECK (stock >= 0)` constraint
//! in the schema (`migrations/0001_inventory_adjustments.sql`) is the last
//! line of defense.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StockStoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StockStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (check constraint violation) | `23514` | `Storage` | Stock would go negative (guard bypassed; schema caught it) |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! All storage-level failures are transient from the caller's perspective;
//! the engine call is safe to retry because of the idempotency ledger.
//!
//! ## Thread Safety
//!
//! `PostgresStockStore` is `Send + Sync` and can be shared across threads.
//! All operations use the SQLx connection pool which handles thread-safe
//! connection management.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use atelier_core::ProductId;

use super::r#trait::{ProductRecord, StockStore, StockStoreError};

/// Postgres-backed guarded stock store.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    /// Create a new PostgresStockStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Conditionally decrement one product's stock.
    ///
    /// Returns `Ok(false)` when the row exists but holds less than
    /// `quantity`; the row is untouched in that case.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn try_decrease(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<bool, StockStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2
            WHERE product_id = $1 AND stock >= $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(quantity)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("try_decrease", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Zero rows: either a decline or a missing product. One more read
        // tells them apart; the guarded UPDATE above stays the only mutation.
        if self.product_exists(product_id).await? {
            Ok(false)
        } else {
            Err(StockStoreError::ProductNotFound(product_id))
        }
    }

    /// Increment one product's stock.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn increase(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StockStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(quantity)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increase", e))?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(StockStoreError::ProductNotFound(product_id))
        }
    }

    /// Current stock quantity for a product.
    pub async fn stock(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        self.fetch_record(product_id).await.map(|r| r.stock)
    }

    /// Load the full stock row projection.
    pub async fn fetch_record(
        &self,
        product_id: ProductId,
    ) -> Result<ProductRecord, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, stock
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_record", e))?
        .ok_or(StockStoreError::ProductNotFound(product_id))?;

        Ok(ProductRecord {
            product_id: ProductId::from_uuid(
                row.try_get("product_id")
                    .map_err(|e| StockStoreError::Storage(format!("bad product row: {e}")))?,
            ),
            name: row
                .try_get("name")
                .map_err(|e| StockStoreError::Storage(format!("bad product row: {e}")))?,
            stock: row
                .try_get("stock")
                .map_err(|e| StockStoreError::Storage(format!("bad product row: {e}")))?,
        })
    }

    async fn product_exists(&self, product_id: ProductId) -> Result<bool, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(SELECT 1 FROM products WHERE product_id = $1) AS present
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_exists", e))?;

        row.try_get("present")
            .map_err(|e| StockStoreError::Storage(format!("bad exists row: {e}")))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StockStoreError {
    match err {
        sqlx::Error::Database(db_err) => StockStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StockStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StockStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

// Implement StockStore trait

impl StockStore for PostgresStockStore {
    fn try_decrease(&self, product_id: ProductId, quantity: i64) -> Result<bool, StockStoreError> {
        // The StockStore trait is synchronous, but Postgres operations require
        // async. tokio::runtime::Handle runs the async code in a sync context;
        // this works when called from within a tokio runtime.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StockStoreError::Storage(
                "PostgresStockStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.try_decrease(product_id, quantity))
    }

    fn increase(&self, product_id: ProductId, quantity: i64) -> Result<(), StockStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StockStoreError::Storage(
                "PostgresStockStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.increase(product_id, quantity))
    }

    fn stock(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StockStoreError::Storage(
                "PostgresStockStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.stock(product_id))
    }
}
