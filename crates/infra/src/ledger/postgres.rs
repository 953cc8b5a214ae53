//! Postgres-backed idempotency ledger implementation.
//!
//! The atomicity of `record_if_absent` comes from the primary key on
//! `(order_id, direction)`: `INSERT ... ON CONFLICT DO NOTHING` lets exactly
//! one concurrent caller create the row. Finalize and release are guarded
//! `UPDATE`/`DELETE` statements that only touch a still-pending row
//! (`outcome IS NULL`), so a reservation cannot clobber a finalized entry.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `LedgerError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | — | Never surfaces; `ON CONFLICT DO NOTHING` absorbs it |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use atelier_core::OrderId;
use atelier_inventory::{
    AdjustmentDirection, AdjustmentOutcome, AdjustmentRecord, ProductAdjustment,
};

use super::r#trait::{
    AdjustmentHistory, AdjustmentLedger, LedgerError, LedgerInsert, LedgerReservation,
};

/// Postgres-backed idempotency ledger.
#[derive(Debug, Clone)]
pub struct PostgresAdjustmentLedger {
    pool: Arc<PgPool>,
}

impl PostgresAdjustmentLedger {
    /// Create a new PostgresAdjustmentLedger with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert a pending entry for the key if none exists.
    #[instrument(skip(self), fields(order_id = %order_id, direction = %direction), err)]
    pub async fn record_if_absent(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<LedgerInsert, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_adjustments (order_id, direction, requested_at)
            VALUES ($1, $2, now())
            ON CONFLICT (order_id, direction) DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(direction.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_if_absent", e))?;

        if result.rows_affected() == 1 {
            return Ok(LedgerInsert::Reserved(LedgerReservation {
                order_id,
                direction,
            }));
        }

        match self.entry(order_id, direction).await? {
            Some(record) => Ok(LedgerInsert::AlreadyRecorded(record)),
            // The conflicting row was released between our insert and read;
            // transient, the caller retries.
            None => Err(LedgerError::Storage(format!(
                "ledger entry for {order_id}/{direction} vanished during insert"
            ))),
        }
    }

    /// Write the terminal outcome for a still-pending row.
    #[instrument(
        skip(self, products),
        fields(order_id = %reservation.order_id, direction = %reservation.direction, outcome = outcome.message_code()),
        err
    )]
    pub async fn finalize(
        &self,
        reservation: LedgerReservation,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
    ) -> Result<AdjustmentRecord, LedgerError> {
        let products_json = serde_json::to_value(&products)
            .map_err(|e| LedgerError::Storage(format!("product results serialization failed: {e}")))?;

        let row = sqlx::query(
            r#"
            UPDATE inventory_adjustments
            SET outcome = $3, products = $4, applied_at = now()
            WHERE order_id = $1 AND direction = $2 AND outcome IS NULL
            RETURNING order_id, direction, outcome, products, requested_at, applied_at
            "#,
        )
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.direction.as_str())
        .bind(outcome.message_code())
        .bind(products_json)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("finalize", e))?;

        match row {
            Some(row) => {
                let record = AdjustmentRow::from_row(&row)
                    .map_err(|e| LedgerError::Storage(format!("bad ledger row: {e}")))?;
                record.try_into()
            }
            None => Err(LedgerError::StaleReservation {
                order_id: reservation.order_id,
                direction: reservation.direction,
            }),
        }
    }

    /// Remove a still-pending row so a retry can win the key again.
    #[instrument(
        skip(self),
        fields(order_id = %reservation.order_id, direction = %reservation.direction),
        err
    )]
    pub async fn release(&self, reservation: LedgerReservation) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_adjustments
            WHERE order_id = $1 AND direction = $2 AND outcome IS NULL
            "#,
        )
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.direction.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release", e))?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(LedgerError::StaleReservation {
                order_id: reservation.order_id,
                direction: reservation.direction,
            })
        }
    }

    /// Read one entry, pending or finalized.
    pub async fn entry(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<Option<AdjustmentRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, direction, outcome, products, requested_at, applied_at
            FROM inventory_adjustments
            WHERE order_id = $1 AND direction = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(direction.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("entry", e))?;

        match row {
            Some(row) => {
                let record = AdjustmentRow::from_row(&row)
                    .map_err(|e| LedgerError::Storage(format!("bad ledger row: {e}")))?;
                Ok(Some(record.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn history_rows(&self, order_id: OrderId) -> Result<Vec<AdjustmentRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, direction, outcome, products, requested_at, applied_at
            FROM inventory_adjustments
            WHERE order_id = $1
            ORDER BY requested_at ASC, direction ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = AdjustmentRow::from_row(&row)
                .map_err(|e| LedgerError::Storage(format!("bad ledger row: {e}")))?;
            records.push(record.try_into()?);
        }
        Ok(records)
    }
}

#[derive(Debug)]
struct AdjustmentRow {
    order_id: uuid::Uuid,
    direction: String,
    outcome: Option<String>,
    products: serde_json::Value,
    requested_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for AdjustmentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AdjustmentRow {
            order_id: row.try_get("order_id")?,
            direction: row.try_get("direction")?,
            outcome: row.try_get("outcome")?,
            products: row.try_get("products")?,
            requested_at: row.try_get("requested_at")?,
            applied_at: row.try_get("applied_at")?,
        })
    }
}

impl TryFrom<AdjustmentRow> for AdjustmentRecord {
    type Error = LedgerError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        let direction = direction_from_code(&row.direction).ok_or_else(|| {
            LedgerError::Storage(format!("unknown direction code '{}'", row.direction))
        })?;

        let outcome = match row.outcome.as_deref() {
            None => None,
            Some(code) => Some(outcome_from_code(code).ok_or_else(|| {
                LedgerError::Storage(format!("unknown outcome code '{code}'"))
            })?),
        };

        let products: Vec<ProductAdjustment> = serde_json::from_value(row.products)
            .map_err(|e| LedgerError::Storage(format!("bad product results payload: {e}")))?;

        Ok(AdjustmentRecord {
            order_id: OrderId::from_uuid(row.order_id),
            direction,
            outcome,
            products,
            requested_at: row.requested_at,
            applied_at: row.applied_at,
        })
    }
}

fn direction_from_code(code: &str) -> Option<AdjustmentDirection> {
    match code {
        "DECREASE" => Some(AdjustmentDirection::Decrease),
        "INCREASE" => Some(AdjustmentDirection::Increase),
        _ => None,
    }
}

fn outcome_from_code(code: &str) -> Option<AdjustmentOutcome> {
    match code {
        "APPLIED" => Some(AdjustmentOutcome::Applied),
        "ALREADY_APPLIED_OR_INVALID_STATE" => Some(AdjustmentOutcome::AlreadyApplied),
        "NOT_FOUND" => Some(AdjustmentOutcome::NotFound),
        "PARTIAL" => Some(AdjustmentOutcome::Partial),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => LedgerError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            LedgerError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => LedgerError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

// Implement AdjustmentLedger trait

impl AdjustmentLedger for PostgresAdjustmentLedger {
    fn record_if_absent(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<LedgerInsert, LedgerError> {
        // Sync trait over async IO; same bridge as the other Postgres
        // adapters. Requires a tokio runtime on the calling thread's context.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerError::Storage(
                "PostgresAdjustmentLedger requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.record_if_absent(order_id, direction))
    }

    fn finalize(
        &self,
        reservation: LedgerReservation,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
    ) -> Result<AdjustmentRecord, LedgerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerError::Storage(
                "PostgresAdjustmentLedger requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.finalize(reservation, outcome, products))
    }

    fn release(&self, reservation: LedgerReservation) -> Result<(), LedgerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerError::Storage(
                "PostgresAdjustmentLedger requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.release(reservation))
    }

    fn entry(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<Option<AdjustmentRecord>, LedgerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerError::Storage(
                "PostgresAdjustmentLedger requires async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })?;

        handle.block_on(self.entry(order_id, direction))
    }
}

#[async_trait::async_trait]
impl AdjustmentHistory for PostgresAdjustmentLedger {
    async fn history(&self, order_id: OrderId) -> Result<Vec<AdjustmentRecord>, LedgerError> {
        self.history_rows(order_id).await
    }
}
