use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, OrderId, ProductId};

/// Order status lifecycle.
///
/// Forward path: `Placed → Confirmed → Shipped → Delivered`.
/// Cancellation: `Placed | Confirmed → CancelRequested → Cancelled`.
/// Refund: `Delivered → RefundRequested → Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Confirmed,
    Shipped,
    Delivered,
    CancelRequested,
    Cancelled,
    RefundRequested,
    Refunded,
}

impl OrderStatus {
    /// Statuses reached by taking stock out of inventory.
    pub fn triggers_decrease(self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Statuses reached by returning stock to inventory.
    pub fn triggers_increase(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

/// Order line: product, quantity, unit price.
///
/// Immutable once the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents). Pass-through for
    /// settlement; inventory adjustment never reads it.
    pub unit_price: u64,
}

impl OrderLine {
    pub fn new(
        line_no: u32,
        product_id: ProductId,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self {
            line_no,
            product_id,
            quantity,
            unit_price,
        })
    }
}

/// A buyer order: identity, lifecycle status, and its ordered lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    placed_at: DateTime<Utc>,
}

impl Order {
    /// Place a new order. Lines are frozen from this point on.
    pub fn place(id: OrderId, lines: Vec<OrderLine>, placed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: OrderStatus::Placed,
            lines,
            placed_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn confirm(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::Placed, OrderStatus::Confirmed)
    }

    pub fn ship(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::Confirmed, OrderStatus::Shipped)
    }

    pub fn deliver(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::Shipped, OrderStatus::Delivered)
    }

    pub fn request_cancel(&mut self) -> DomainResult<()> {
        match self.status {
            OrderStatus::Placed | OrderStatus::Confirmed => {
                self.status = OrderStatus::CancelRequested;
                Ok(())
            }
            other => Err(DomainError::invariant(format!(
                "cannot request cancel from {other:?}"
            ))),
        }
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::CancelRequested, OrderStatus::Cancelled)
    }

    pub fn request_refund(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::Delivered, OrderStatus::RefundRequested)
    }

    pub fn refund(&mut self) -> DomainResult<()> {
        self.transition(OrderStatus::RefundRequested, OrderStatus::Refunded)
    }

    fn transition(&mut self, from: OrderStatus, to: OrderStatus) -> DomainResult<()> {
        if self.status != from {
            return Err(DomainError::invariant(format!(
                "cannot move to {to:?} from {:?}",
                self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

/// Group an order's lines by product and sum quantities.
///
/// Sums across all lines regardless of any line-level status; an order with
/// no lines yields an empty map. `BTreeMap` keeps iteration in ascending
/// product-id order, so downstream per-product work is deterministic.
pub fn aggregate_lines(lines: &[OrderLine]) -> BTreeMap<ProductId, i64> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.product_id).or_insert(0) += line.quantity;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order_id() -> OrderId {
        OrderId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(product_id: ProductId, quantity: i64) -> OrderLine {
        OrderLine::new(0, product_id, quantity, 1_000).unwrap()
    }

    #[test]
    fn order_line_rejects_non_positive_quantity() {
        let err = OrderLine::new(1, test_product_id(), 0, 500).unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("positive")),
            _ => panic!("Expected validation error"),
        }

        assert!(OrderLine::new(1, test_product_id(), -3, 500).is_err());
    }

    #[test]
    fn placed_order_confirms_then_ships_then_delivers() {
        let mut order = Order::place(test_order_id(), vec![], test_time());
        assert_eq!(order.status(), OrderStatus::Placed);

        order.confirm().unwrap();
        assert!(order.status().triggers_decrease());

        order.ship().unwrap();
        order.deliver().unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn cancel_path_requires_cancel_request_first() {
        let mut order = Order::place(test_order_id(), vec![], test_time());

        let err = order.cancel().unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected invariant violation"),
        }

        order.request_cancel().unwrap();
        order.cancel().unwrap();
        assert!(order.status().triggers_increase());
        assert!(order.status().is_terminal());
    }

    #[test]
    fn refund_path_only_from_delivered() {
        let mut order = Order::place(test_order_id(), vec![], test_time());
        assert!(order.request_refund().is_err());

        order.confirm().unwrap();
        order.ship().unwrap();
        order.deliver().unwrap();
        order.request_refund().unwrap();
        order.refund().unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);
    }

    #[test]
    fn shipped_order_cannot_request_cancel() {
        let mut order = Order::place(test_order_id(), vec![], test_time());
        order.confirm().unwrap();
        order.ship().unwrap();
        assert!(order.request_cancel().is_err());
    }

    #[test]
    fn aggregate_lines_sums_duplicate_products() {
        let p1 = test_product_id();
        let p2 = test_product_id();
        let lines = vec![line(p1, 2), line(p2, 3), line(p1, 5)];

        let totals = aggregate_lines(&lines);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&p1], 7);
        assert_eq!(totals[&p2], 3);
    }

    #[test]
    fn aggregate_lines_on_empty_order_is_empty() {
        assert!(aggregate_lines(&[]).is_empty());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: aggregation preserves the total quantity across all lines.
            #[test]
            fn aggregation_preserves_total_quantity(
                quantities in prop::collection::vec(1i64..10_000i64, 0..20),
                product_pool in 1usize..5usize,
            ) {
                let products: Vec<ProductId> = (0..product_pool)
                    .map(|n| ProductId::from_uuid(uuid_from_index(n)))
                    .collect();

                let lines: Vec<OrderLine> = quantities
                    .iter()
                    .enumerate()
                    .map(|(i, &qty)| {
                        OrderLine::new(i as u32, products[i % products.len()], qty, 100).unwrap()
                    })
                    .collect();

                let totals = aggregate_lines(&lines);
                let summed: i64 = totals.values().sum();
                let expected: i64 = quantities.iter().sum();
                prop_assert_eq!(summed, expected);

                for total in totals.values() {
                    prop_assert!(*total > 0);
                }
            }
        }

        fn uuid_from_index(n: usize) -> uuid::Uuid {
            uuid::Uuid::from_u128(n as u128 + 1)
        }
    }
}
