//! Postgres-backed order store implementation.
//!
//! Reads the `orders` / `order_lines` tables and projects rows into typed
//! `OrderLine` values field-by-field at this boundary; nothing reflective,
//! nothing entity-mapped.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use atelier_core::{OrderId, ProductId};
use atelier_orders::OrderLine;

use super::r#trait::{OrderStore, OrderStoreError};

/// Postgres-backed order line reader.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    /// Create a new PostgresOrderStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// All lines of one order, in line-number order.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderStoreError> {
        let exists = sqlx::query(
            r#"
            SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = $1) AS present
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_exists", e))?
        .try_get::<bool, _>("present")
        .map_err(|e| OrderStoreError::Storage(format!("bad exists row: {e}")))?;

        if !exists {
            return Err(OrderStoreError::OrderNotFound(order_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT line_no, product_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_lines", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line = OrderLineRow::from_row(&row)
                .map_err(|e| OrderStoreError::Storage(format!("bad order line row: {e}")))?;
            lines.push(line.into());
        }
        Ok(lines)
    }
}

#[derive(Debug)]
struct OrderLineRow {
    line_no: i32,
    product_id: uuid::Uuid,
    quantity: i64,
    unit_price: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderLineRow {
            line_no: row.try_get("line_no")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
        })
    }
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        OrderLine {
            line_no: row.line_no as u32,
            product_id: ProductId::from_uuid(row.product_id),
            quantity: row.quantity,
            unit_price: row.unit_price as u64,
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> OrderStoreError {
    match err {
        sqlx::Error::Database(db_err) => OrderStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            OrderStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => OrderStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

// Implement OrderStore trait

impl OrderStore for PostgresOrderStore {
    fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderStoreError> {
        // Sync trait over async IO; same bridge as the other Postgres
        // adapters. Requires a tokio runtime on the calling thread's context.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            OrderStoreError::Storage(
                "PostgresOrderStore requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.order_lines(order_id))
    }
}
