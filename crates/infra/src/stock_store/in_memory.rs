use std::collections::HashMap;
use std::sync::RwLock;

use atelier_core::ProductId;

use super::r#trait::{ProductRecord, StockStore, StockStoreError};

/// In-memory stock store.
///
/// Intended for tests/dev. Guarded mutation is atomic per call because every
/// mutation runs under the single write lock.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    products: RwLock<HashMap<ProductId, ProductRecord>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product row. Replaces any existing row for the id.
    pub fn insert_product(&self, product_id: ProductId, name: impl Into<String>, stock: i64) {
        if let Ok(mut products) = self.products.write() {
            products.insert(
                product_id,
                ProductRecord {
                    product_id,
                    name: name.into(),
                    stock,
                },
            );
        }
    }
}

impl StockStore for InMemoryStockStore {
    fn try_decrease(&self, product_id: ProductId, quantity: i64) -> Result<bool, StockStoreError> {
        let mut products = self
            .products
            .write()
            .map_err(|_| StockStoreError::Storage("lock poisoned".to_string()))?;

        let record = products
            .get_mut(&product_id)
            .ok_or(StockStoreError::ProductNotFound(product_id))?;

        if record.stock < quantity {
            return Ok(false);
        }
        record.stock -= quantity;
        Ok(true)
    }

    fn increase(&self, product_id: ProductId, quantity: i64) -> Result<(), StockStoreError> {
        let mut products = self
            .products
            .write()
            .map_err(|_| StockStoreError::Storage("lock poisoned".to_string()))?;

        let record = products
            .get_mut(&product_id)
            .ok_or(StockStoreError::ProductNotFound(product_id))?;

        record.stock += quantity;
        Ok(())
    }

    fn stock(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        let products = self
            .products
            .read()
            .map_err(|_| StockStoreError::Storage("lock poisoned".to_string()))?;

        products
            .get(&product_id)
            .map(|r| r.stock)
            .ok_or(StockStoreError::ProductNotFound(product_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn store_with(stock: i64) -> (InMemoryStockStore, ProductId) {
        let store = InMemoryStockStore::new();
        let product_id = ProductId::new();
        store.insert_product(product_id, "ceramic mug", stock);
        (store, product_id)
    }

    #[test]
    fn try_decrease_applies_when_stock_is_sufficient() {
        let (store, product_id) = store_with(10);

        assert!(store.try_decrease(product_id, 4).unwrap());
        assert_eq!(store.stock(product_id).unwrap(), 6);
    }

    #[test]
    fn try_decrease_declines_without_mutating_when_stock_is_short() {
        let (store, product_id) = store_with(5);

        assert!(!store.try_decrease(product_id, 10).unwrap());
        assert_eq!(store.stock(product_id).unwrap(), 5);
    }

    #[test]
    fn try_decrease_to_exactly_zero_is_allowed() {
        let (store, product_id) = store_with(3);

        assert!(store.try_decrease(product_id, 3).unwrap());
        assert_eq!(store.stock(product_id).unwrap(), 0);
    }

    #[test]
    fn zero_quantity_is_a_noop_success() {
        let (store, product_id) = store_with(5);

        assert!(store.try_decrease(product_id, 0).unwrap());
        store.increase(product_id, 0).unwrap();
        assert_eq!(store.stock(product_id).unwrap(), 5);
    }

    #[test]
    fn unknown_product_fails_on_every_operation() {
        let store = InMemoryStockStore::new();
        let product_id = ProductId::new();

        match store.try_decrease(product_id, 1) {
            Err(StockStoreError::ProductNotFound(id)) => assert_eq!(id, product_id),
            other => panic!("Expected ProductNotFound, got {other:?}"),
        }
        assert!(store.increase(product_id, 1).is_err());
        assert!(store.stock(product_id).is_err());
    }

    #[test]
    fn increase_accumulates() {
        let (store, product_id) = store_with(1);

        store.increase(product_id, 2).unwrap();
        store.increase(product_id, 3).unwrap();
        assert_eq!(store.stock(product_id).unwrap(), 6);
    }

    #[test]
    fn concurrent_guarded_decrements_never_oversell() {
        let (store, product_id) = store_with(10);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.try_decrease(product_id, 1).unwrap())
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();

        // Ten units existed; exactly ten of sixteen racers win.
        assert_eq!(applied, 10);
        assert_eq!(store.stock(product_id).unwrap(), 0);
    }
}
