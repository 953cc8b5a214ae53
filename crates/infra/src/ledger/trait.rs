use std::sync::Arc;

use thiserror::Error;

use atelier_core::OrderId;
use atelier_inventory::{AdjustmentDirection, AdjustmentOutcome, AdjustmentRecord, ProductAdjustment};

/// Proof of having won the insert-if-absent race for one key.
///
/// Consumed by `finalize` or `release`; taking it by value keeps a single
/// reservation from being finalized twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReservation {
    pub order_id: OrderId,
    pub direction: AdjustmentDirection,
}

/// Result of the atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerInsert {
    /// This caller created the entry and holds the right to apply.
    Reserved(LedgerReservation),
    /// The key was already present (finalized or still in flight); this
    /// caller must not mutate stock.
    AlreadyRecorded(AdjustmentRecord),
}

/// Ledger operation error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transient infrastructure failure; safe to retry the engine call.
    #[error("ledger storage unavailable: {0}")]
    Storage(String),

    /// Finalize/release hit a key with no pending entry. Indicates misuse of
    /// a reservation (or an entry finalized behind the holder's back).
    #[error("no pending ledger entry for {order_id}/{direction}")]
    StaleReservation {
        order_id: OrderId,
        direction: AdjustmentDirection,
    },
}

/// Durable record of which (order, direction) adjustments have been applied.
///
/// Implementations must make `record_if_absent` atomic — a map entry created
/// under one lock, or a unique-constraint insert — so that concurrent callers
/// racing on the same key see exactly one `Reserved`.
pub trait AdjustmentLedger: Send + Sync {
    /// Insert a pending entry for the key if none exists.
    fn record_if_absent(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<LedgerInsert, LedgerError>;

    /// Write the terminal outcome once stock mutation work completes.
    /// Returns the finalized record.
    fn finalize(
        &self,
        reservation: LedgerReservation,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
    ) -> Result<AdjustmentRecord, LedgerError>;

    /// Roll a still-pending reservation back after a transient failure that
    /// mutated nothing, so a retry can win the key again. A finalized entry
    /// is never released.
    fn release(&self, reservation: LedgerReservation) -> Result<(), LedgerError>;

    /// Read one entry, pending or finalized.
    fn entry(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<Option<AdjustmentRecord>, LedgerError>;
}

impl<L> AdjustmentLedger for Arc<L>
where
    L: AdjustmentLedger + ?Sized,
{
    fn record_if_absent(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<LedgerInsert, LedgerError> {
        (**self).record_if_absent(order_id, direction)
    }

    fn finalize(
        &self,
        reservation: LedgerReservation,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
    ) -> Result<AdjustmentRecord, LedgerError> {
        (**self).finalize(reservation, outcome, products)
    }

    fn release(&self, reservation: LedgerReservation) -> Result<(), LedgerError> {
        (**self).release(reservation)
    }

    fn entry(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<Option<AdjustmentRecord>, LedgerError> {
        (**self).entry(order_id, direction)
    }
}

/// Read model over the ledger for dashboards and reconciliation views.
#[async_trait::async_trait]
pub trait AdjustmentHistory: Send + Sync {
    /// All recorded adjustments for an order, oldest first.
    async fn history(&self, order_id: OrderId) -> Result<Vec<AdjustmentRecord>, LedgerError>;
}
