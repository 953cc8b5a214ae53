//! Inventory adjustment engine (application-level orchestration).
//!
//! One engine call applies one (order, direction) adjustment as a unit of
//! work:
//!
//! ```text
//! Lifecycle trigger (confirm / cancel / refund)
//!   ↓
//! 1. Ledger insert-if-absent (sole serialization point per key)
//!   ↓
//! 2. Aggregate order lines by product
//!   ↓
//! 3. Guarded mutation per product, ascending product-id order
//!   ↓
//! 4. Finalize ledger entry with outcome + per-product results
//! ```
//!
//! The ledger makes the whole unit idempotent: a retry, duplicate lifecycle
//! event, or manual re-trigger after step 1 has run is answered from the
//! recorded entry and never touches stock. Within one call, each product's
//! mutation is independently atomic but the set is not all-or-nothing —
//! partial success is a first-class outcome that the caller compensates for,
//! not an error.
//!
//! ## Failure handling
//!
//! Business conditions (insufficient stock, unknown product, unknown order,
//! duplicate application) travel inside `AdjustmentResult`. `EngineError` is
//! reserved for transient storage failures and is always safe to retry:
//!
//! - before any stock moved, the pending ledger entry is released so the
//!   retry re-enters at step 1;
//! - after some stock moved, the entry is finalized as `Partial` with the
//!   results so far (releasing it would let a retry re-apply them), and the
//!   error still propagates so the caller knows the call did not run to
//!   completion.
//!
//! A crash between reservation and finalize/release leaves a pending entry;
//! later calls for that key report `ALREADY_APPLIED_OR_INVALID_STATE` and the
//! entry is visible for reconciliation through the ledger read side.

use thiserror::Error;

use atelier_core::{OrderId, ProductId};
use atelier_inventory::{
    AdjustmentDirection, AdjustmentOutcome, AdjustmentResult, ProductAdjustment,
};
use atelier_orders::aggregate_lines;
use tracing::{info, instrument, warn};

use crate::ledger::{AdjustmentLedger, LedgerError, LedgerInsert, LedgerReservation};
use crate::order_store::{OrderStore, OrderStoreError};
use crate::stock_store::{StockStore, StockStoreError};

/// Transient, retryable failure of an engine call.
///
/// Distinguishable from business outcomes by construction: anything a caller
/// should handle as data is in `AdjustmentResult`, anything here means "try
/// the whole call again".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("order store failure: {0}")]
    Orders(#[source] OrderStoreError),

    #[error("stock store failure: {0}")]
    Stock(#[source] StockStoreError),

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

/// Orchestrates ledger, order lines, and guarded stock mutation.
///
/// Generic over its three collaborators so it runs against the in-memory
/// stores in tests and the Postgres adapters in production, unchanged.
#[derive(Debug)]
pub struct InventoryAdjustmentEngine<O, S, L> {
    orders: O,
    stock: S,
    ledger: L,
}

impl<O, S, L> InventoryAdjustmentEngine<O, S, L>
where
    O: OrderStore,
    S: StockStore,
    L: AdjustmentLedger,
{
    pub fn new(orders: O, stock: S, ledger: L) -> Self {
        Self {
            orders,
            stock,
            ledger,
        }
    }

    /// Take an order's aggregated quantities out of stock.
    ///
    /// Invoked on order confirmation. Applied at most once per order;
    /// repeated calls return `ALREADY_APPLIED_OR_INVALID_STATE` without
    /// touching stock.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn apply_decrease(&self, order_id: OrderId) -> Result<AdjustmentResult, EngineError> {
        self.apply(order_id, AdjustmentDirection::Decrease)
    }

    /// Return an order's aggregated quantities to stock.
    ///
    /// Invoked on cancellation or refund approval. Applied at most once per
    /// order. The engine does not verify that a matching decrease was
    /// previously applied; callers must only trigger this from lifecycle
    /// states where the decrease is known to have happened.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn apply_increase(&self, order_id: OrderId) -> Result<AdjustmentResult, EngineError> {
        self.apply(order_id, AdjustmentDirection::Increase)
    }

    fn apply(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<AdjustmentResult, EngineError> {
        let reservation = match self.ledger.record_if_absent(order_id, direction)? {
            LedgerInsert::Reserved(reservation) => reservation,
            LedgerInsert::AlreadyRecorded(record) => {
                info!(
                    direction = %direction,
                    pending = record.is_pending(),
                    "adjustment already recorded; answering from ledger"
                );
                return Ok(AdjustmentResult::already_applied(order_id, direction));
            }
        };

        let lines = match self.orders.order_lines(order_id) {
            Ok(lines) => lines,
            Err(OrderStoreError::OrderNotFound(_)) => {
                self.ledger
                    .finalize(reservation, AdjustmentOutcome::NotFound, Vec::new())?;
                info!(direction = %direction, "order not found; adjustment recorded as NOT_FOUND");
                return Ok(AdjustmentResult::order_not_found(order_id, direction));
            }
            Err(err) => {
                self.release_untouched(reservation);
                return Err(EngineError::Orders(err));
            }
        };

        let mut products: Vec<ProductAdjustment> = Vec::new();
        for (product_id, quantity) in aggregate_lines(&lines) {
            let product = match self.mutate(product_id, quantity, direction) {
                Ok(product) => product,
                Err(err) => {
                    return Err(self.abort_mid_flight(reservation, products, err));
                }
            };
            products.push(product);
        }

        let result = AdjustmentResult::from_products(order_id, direction, products);
        self.ledger
            .finalize(reservation, result.outcome, result.products.clone())?;

        match result.outcome {
            AdjustmentOutcome::Partial => warn!(
                direction = %direction,
                processed_count = result.processed_count,
                total_quantity_moved = result.total_quantity_moved,
                "adjustment applied partially"
            ),
            outcome => info!(
                direction = %direction,
                outcome = outcome.message_code(),
                processed_count = result.processed_count,
                total_quantity_moved = result.total_quantity_moved,
                "adjustment finished"
            ),
        }

        Ok(result)
    }

    /// One product's guarded mutation. Business declines come back as
    /// `ProductAdjustment`s; only transient storage failures are `Err`.
    fn mutate(
        &self,
        product_id: ProductId,
        quantity: i64,
        direction: AdjustmentDirection,
    ) -> Result<ProductAdjustment, StockStoreError> {
        match direction {
            AdjustmentDirection::Decrease => match self.stock.try_decrease(product_id, quantity) {
                Ok(true) => Ok(ProductAdjustment::applied(product_id, quantity)),
                Ok(false) => Ok(ProductAdjustment::insufficient_stock(product_id, quantity)),
                Err(StockStoreError::ProductNotFound(_)) => {
                    Ok(ProductAdjustment::product_not_found(product_id, quantity))
                }
                Err(err) => Err(err),
            },
            AdjustmentDirection::Increase => match self.stock.increase(product_id, quantity) {
                Ok(()) => Ok(ProductAdjustment::applied(product_id, quantity)),
                Err(StockStoreError::ProductNotFound(_)) => {
                    Ok(ProductAdjustment::product_not_found(product_id, quantity))
                }
                Err(err) => Err(err),
            },
        }
    }

    /// Transient failure mid-loop. If nothing moved yet the reservation is
    /// released and the retry starts clean; once stock has moved, the entry
    /// is finalized as `Partial` so a retry cannot re-apply the moved subset.
    fn abort_mid_flight(
        &self,
        reservation: LedgerReservation,
        products: Vec<ProductAdjustment>,
        err: StockStoreError,
    ) -> EngineError {
        let anything_moved = products.iter().any(|p| p.is_applied());
        if anything_moved {
            if let Err(ledger_err) =
                self.ledger
                    .finalize(reservation, AdjustmentOutcome::Partial, products)
            {
                warn!(error = %ledger_err, "failed to finalize partial entry after storage failure");
            }
        } else {
            self.release_untouched(reservation);
        }
        EngineError::Stock(err)
    }

    fn release_untouched(&self, reservation: LedgerReservation) {
        if let Err(err) = self.ledger.release(reservation) {
            warn!(error = %err, "failed to release pending ledger entry");
        }
    }
}
