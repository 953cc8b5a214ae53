use std::collections::HashMap;
use std::sync::RwLock;

use atelier_core::OrderId;
use atelier_orders::{Order, OrderLine};

use super::r#trait::{OrderStore, OrderStoreError};

/// In-memory order store.
///
/// Intended for tests/dev. Holds full `Order` values; the trait only exposes
/// the line read the engine needs.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order. Replaces any existing order with the same id.
    pub fn insert_order(&self, order: Order) {
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(order.id(), order);
        }
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.read().ok()?.get(&order_id).cloned()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderStoreError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderStoreError::Storage("lock poisoned".to_string()))?;

        orders
            .get(&order_id)
            .map(|order| order.lines().to_vec())
            .ok_or(OrderStoreError::OrderNotFound(order_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use atelier_core::ProductId;

    use super::*;

    #[test]
    fn returns_lines_for_a_seeded_order() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        let product_id = ProductId::new();
        let lines = vec![OrderLine::new(1, product_id, 2, 4_500).unwrap()];
        store.insert_order(Order::place(order_id, lines.clone(), Utc::now()));

        assert_eq!(store.order_lines(order_id).unwrap(), lines);
    }

    #[test]
    fn order_with_no_lines_yields_empty_vector() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store.insert_order(Order::place(order_id, vec![], Utc::now()));

        assert!(store.order_lines(order_id).unwrap().is_empty());
    }

    #[test]
    fn unknown_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();

        match store.order_lines(order_id) {
            Err(OrderStoreError::OrderNotFound(id)) => assert_eq!(id, order_id),
            other => panic!("Expected OrderNotFound, got {other:?}"),
        }
    }
}
