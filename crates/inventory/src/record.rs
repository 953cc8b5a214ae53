use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::OrderId;

use crate::adjustment::{AdjustmentDirection, AdjustmentOutcome, ProductAdjustment};

/// Durable ledger entry for one (order, direction) adjustment.
///
/// Created exactly once per key, on the first call that wins the
/// insert-if-absent race; never deleted after finalization. A record whose
/// `outcome` is still empty marks an application in flight (or one that
/// crashed between reservation and finalization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub order_id: OrderId,
    pub direction: AdjustmentDirection,
    pub outcome: Option<AdjustmentOutcome>,
    pub products: Vec<ProductAdjustment>,
    /// When the key was first reserved.
    pub requested_at: DateTime<Utc>,
    /// When the terminal outcome was written.
    pub applied_at: Option<DateTime<Utc>>,
}

impl AdjustmentRecord {
    /// A freshly reserved entry with no terminal outcome yet.
    pub fn pending(
        order_id: OrderId,
        direction: AdjustmentDirection,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            direction,
            outcome: None,
            products: Vec::new(),
            requested_at,
            applied_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    /// Write the terminal outcome. Finalization happens once; the record is
    /// immutable afterwards.
    pub fn finalize(
        &mut self,
        outcome: AdjustmentOutcome,
        products: Vec<ProductAdjustment>,
        applied_at: DateTime<Utc>,
    ) {
        self.outcome = Some(outcome);
        self.products = products;
        self.applied_at = Some(applied_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_record_has_no_outcome() {
        let record =
            AdjustmentRecord::pending(OrderId::new(), AdjustmentDirection::Decrease, Utc::now());
        assert!(record.is_pending());
        assert!(record.products.is_empty());
        assert!(record.applied_at.is_none());
    }

    #[test]
    fn finalize_stamps_outcome_and_time() {
        let mut record =
            AdjustmentRecord::pending(OrderId::new(), AdjustmentDirection::Increase, Utc::now());

        let applied_at = Utc::now();
        record.finalize(AdjustmentOutcome::Applied, Vec::new(), applied_at);

        assert!(!record.is_pending());
        assert_eq!(record.outcome, Some(AdjustmentOutcome::Applied));
        assert_eq!(record.applied_at, Some(applied_at));
    }
}
