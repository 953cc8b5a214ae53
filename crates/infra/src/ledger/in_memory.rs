use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use chrono::Utc;

use atelier_core::OrderId;
use atelier_inventory::{
    AdjustmentDirection, AdjustmentOutcome, AdjustmentRecord, ProductAdjustment,
};

use super::r#trait::{
    AdjustmentHistory, AdjustmentLedger, LedgerError, LedgerInsert, LedgerReservation,
};

type LedgerKey = (OrderId, AdjustmentDirection);

/// In-memory idempotency ledger.
///
/// Intended for tests/dev. One mutex guards the whole map, which makes the
/// insert-if-absent trivially atomic: the `Entry` check and the insert happen
/// under the same lock acquisition.
#[derive(Debug, Default)]
pub struct InMemoryAdjustmentLedger {
    entries: Mutex<HashMap<LedgerKey, AdjustmentRecord>>,
}

impl InMemoryAdjustmentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdjustmentLedger for InMemoryAdjustmentLedger {
    fn record_if_absent(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<LedgerInsert, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        match entries.entry((order_id, direction)) {
            Entry::Occupied(existing) => Ok(LedgerInsert::AlreadyRecorded(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(AdjustmentRecord::pending(order_id, direction, Utc::now()));
                Ok(LedgerInsert::Reserved(LedgerReservation {
                    order_id,
                    direction,
                }))
            }
        }
    }

    fn finalize(
        &self,
        reservation: LedgerReservation,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
    ) -> Result<AdjustmentRecord, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let key = (reservation.order_id, reservation.direction);
        match entries.get_mut(&key) {
            Some(record) if record.is_pending() => {
                record.finalize(outcome, products, Utc::now());
                Ok(record.clone())
            }
            _ => Err(LedgerError::StaleReservation {
                order_id: reservation.order_id,
                direction: reservation.direction,
            }),
        }
    }

    fn release(&self, reservation: LedgerReservation) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let key = (reservation.order_id, reservation.direction);
        match entries.entry(key) {
            Entry::Occupied(slot) if slot.get().is_pending() => {
                slot.remove();
                Ok(())
            }
            _ => Err(LedgerError::StaleReservation {
                order_id: reservation.order_id,
                direction: reservation.direction,
            }),
        }
    }

    fn entry(
        &self,
        order_id: OrderId,
        direction: AdjustmentDirection,
    ) -> Result<Option<AdjustmentRecord>, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        Ok(entries.get(&(order_id, direction)).cloned())
    }
}

#[async_trait::async_trait]
impl AdjustmentHistory for InMemoryAdjustmentLedger {
    async fn history(&self, order_id: OrderId) -> Result<Vec<AdjustmentRecord>, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let mut records: Vec<AdjustmentRecord> = entries
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        // Tiebreak on direction: a decrease precedes its reversal when both
        // landed in the same instant.
        records.sort_by_key(|r| (r.requested_at, r.direction == AdjustmentDirection::Increase));
        Ok(records)
    }
}
