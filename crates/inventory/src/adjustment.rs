use serde::{Deserialize, Serialize};

use atelier_core::{OrderId, ProductId};

/// Direction of an inventory adjustment relative to stock.
///
/// `Decrease` is driven by order confirmation, `Increase` by cancellation or
/// refund approval. Together with the order id it forms the idempotency key:
/// each (order, direction) pair is applied at most once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentDirection {
    Decrease,
    Increase,
}

impl AdjustmentDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentDirection::Decrease => "DECREASE",
            AdjustmentDirection::Increase => "INCREASE",
        }
    }
}

impl core::fmt::Display for AdjustmentDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the guarded mutation for a single product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductOutcome {
    /// The guarded mutation applied.
    Applied,
    /// The conditional decrement declined (stock < quantity). Decrease only.
    InsufficientStock,
    /// The product id resolved to no stock row.
    ProductNotFound,
}

/// Per-product slice of an adjustment: how much was asked, what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAdjustment {
    pub product_id: ProductId,
    pub quantity: i64,
    pub outcome: ProductOutcome,
}

impl ProductAdjustment {
    pub fn applied(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            outcome: ProductOutcome::Applied,
        }
    }

    pub fn insufficient_stock(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            outcome: ProductOutcome::InsufficientStock,
        }
    }

    pub fn product_not_found(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            outcome: ProductOutcome::ProductNotFound,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == ProductOutcome::Applied
    }
}

/// Terminal outcome of one (order, direction) adjustment.
///
/// The serialized codes are the platform's established message codes and are
/// part of the response contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentOutcome {
    #[serde(rename = "APPLIED")]
    Applied,
    #[serde(rename = "ALREADY_APPLIED_OR_INVALID_STATE")]
    AlreadyApplied,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "PARTIAL")]
    Partial,
}

impl AdjustmentOutcome {
    pub fn message_code(self) -> &'static str {
        match self {
            AdjustmentOutcome::Applied => "APPLIED",
            AdjustmentOutcome::AlreadyApplied => "ALREADY_APPLIED_OR_INVALID_STATE",
            AdjustmentOutcome::NotFound => "NOT_FOUND",
            AdjustmentOutcome::Partial => "PARTIAL",
        }
    }
}

/// Classify per-product results into the order-level outcome.
///
/// - every product applied (or nothing to do) → `Applied`
/// - a strict subset applied → `Partial`
/// - nothing applied, but at least one decline was insufficient stock →
///   `Partial` (insufficient stock is a business outcome against a real row)
/// - nothing applied and every failure was a missing product → `NotFound`
pub fn classify_outcome(products: &[ProductAdjustment]) -> AdjustmentOutcome {
    if products.is_empty() {
        return AdjustmentOutcome::Applied;
    }

    let applied = products.iter().filter(|p| p.is_applied()).count();
    if applied == products.len() {
        return AdjustmentOutcome::Applied;
    }
    if applied > 0 {
        return AdjustmentOutcome::Partial;
    }

    let any_insufficient = products
        .iter()
        .any(|p| p.outcome == ProductOutcome::InsufficientStock);
    if any_insufficient {
        AdjustmentOutcome::Partial
    } else {
        AdjustmentOutcome::NotFound
    }
}

/// Structured response of one engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub order_id: OrderId,
    pub direction: AdjustmentDirection,
    /// Per-product results, in ascending product-id order.
    pub products: Vec<ProductAdjustment>,
    /// Number of products whose guarded mutation applied.
    pub processed_count: usize,
    /// Sum of quantities actually moved.
    pub total_quantity_moved: i64,
    pub outcome: AdjustmentOutcome,
}

impl AdjustmentResult {
    /// Assemble a result from per-product outcomes; counts and the order-level
    /// outcome are derived, never supplied.
    pub fn from_products(
        order_id: OrderId,
        direction: AdjustmentDirection,
        products: Vec<ProductAdjustment>,
    ) -> Self {
        let processed_count = products.iter().filter(|p| p.is_applied()).count();
        let total_quantity_moved = products
            .iter()
            .filter(|p| p.is_applied())
            .map(|p| p.quantity)
            .sum();
        let outcome = classify_outcome(&products);
        Self {
            order_id,
            direction,
            products,
            processed_count,
            total_quantity_moved,
            outcome,
        }
    }

    /// Result answered from the ledger: the key was already recorded, so no
    /// stock was touched by this call.
    pub fn already_applied(order_id: OrderId, direction: AdjustmentDirection) -> Self {
        Self {
            order_id,
            direction,
            products: Vec::new(),
            processed_count: 0,
            total_quantity_moved: 0,
            outcome: AdjustmentOutcome::AlreadyApplied,
        }
    }

    /// Result for an order id that resolved to no order.
    pub fn order_not_found(order_id: OrderId, direction: AdjustmentDirection) -> Self {
        Self {
            order_id,
            direction,
            products: Vec::new(),
            processed_count: 0,
            total_quantity_moved: 0,
            outcome: AdjustmentOutcome::NotFound,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == AdjustmentOutcome::Applied
    }

    /// Product ids whose mutation applied (for compensating action on
    /// `Partial`, the caller needs exactly this subset).
    pub fn applied_product_ids(&self) -> Vec<ProductId> {
        self.products
            .iter()
            .filter(|p| p.is_applied())
            .map(|p| p.product_id)
            .collect()
    }
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

    #[test]
    fn all_applied_classifies_as_applied() {
        let products = vec![
            ProductAdjustment::applied(test_product_id(), 2),
            ProductAdjustment::applied(test_product_id(), 3),
        ];
        assert_eq!(classify_outcome(&products), AdjustmentOutcome::Applied);
    }

    #[test]
    fn no_products_is_a_noop_success() {
        assert_eq!(classify_outcome(&[]), AdjustmentOutcome::Applied);

        let result =
            AdjustmentResult::from_products(test_order_id(), AdjustmentDirection::Decrease, vec![]);
        assert!(result.is_applied());
        assert_eq!(result.processed_count, 0);
        assert_eq!(result.total_quantity_moved, 0);
    }

    #[test]
    fn mixed_success_and_decline_is_partial() {
        // The worked example: (P1, qty 2) applies, (P2, qty 3) declines.
        let p1 = test_product_id();
        let products = vec![
            ProductAdjustment::applied(p1, 2),
            ProductAdjustment::insufficient_stock(test_product_id(), 3),
        ];

        let result =
            AdjustmentResult::from_products(test_order_id(), AdjustmentDirection::Decrease, products);
        assert_eq!(result.outcome, AdjustmentOutcome::Partial);
        assert_eq!(result.processed_count, 1);
        assert_eq!(result.total_quantity_moved, 2);
        assert_eq!(result.applied_product_ids(), vec![p1]);
    }

    #[test]
    fn all_insufficient_is_partial_with_zero_processed() {
        let products = vec![ProductAdjustment::insufficient_stock(test_product_id(), 10)];

        let result =
            AdjustmentResult::from_products(test_order_id(), AdjustmentDirection::Decrease, products);
        assert_eq!(result.outcome, AdjustmentOutcome::Partial);
        assert_eq!(result.processed_count, 0);
        assert_eq!(result.total_quantity_moved, 0);
    }

    #[test]
    fn all_missing_products_is_not_found() {
        let products = vec![
            ProductAdjustment::product_not_found(test_product_id(), 1),
            ProductAdjustment::product_not_found(test_product_id(), 2),
        ];
        assert_eq!(classify_outcome(&products), AdjustmentOutcome::NotFound);
    }

    #[test]
    fn missing_product_beside_a_success_is_partial() {
        let products = vec![
            ProductAdjustment::product_not_found(test_product_id(), 1),
            ProductAdjustment::applied(test_product_id(), 2),
        ];
        assert_eq!(classify_outcome(&products), AdjustmentOutcome::Partial);
    }

    #[test]
    fn outcome_codes_match_the_response_contract() {
        assert_eq!(AdjustmentOutcome::Applied.message_code(), "APPLIED");
        assert_eq!(
            AdjustmentOutcome::AlreadyApplied.message_code(),
            "ALREADY_APPLIED_OR_INVALID_STATE"
        );
        assert_eq!(AdjustmentOutcome::NotFound.message_code(), "NOT_FOUND");
        assert_eq!(AdjustmentOutcome::Partial.message_code(), "PARTIAL");

        let json = serde_json::to_string(&AdjustmentOutcome::AlreadyApplied).unwrap();
        assert_eq!(json, "\"ALREADY_APPLIED_OR_INVALID_STATE\"");
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_product_adjustment() -> impl Strategy<Value = ProductAdjustment> {
            (1i64..1_000i64, 0u8..3u8).prop_map(|(qty, kind)| {
                let product_id = ProductId::new();
                match kind {
                    0 => ProductAdjustment::applied(product_id, qty),
                    1 => ProductAdjustment::insufficient_stock(product_id, qty),
                    _ => ProductAdjustment::product_not_found(product_id, qty),
                }
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: derived counts always agree with the per-product list,
            /// and the outcome is `Applied` exactly when every product applied.
            #[test]
            fn derived_fields_agree_with_products(
                products in prop::collection::vec(arb_product_adjustment(), 0..12)
            ) {
                let result = AdjustmentResult::from_products(
                    OrderId::new(),
                    AdjustmentDirection::Decrease,
                    products.clone(),
                );

                let applied = products.iter().filter(|p| p.is_applied()).count();
                prop_assert_eq!(result.processed_count, applied);

                let moved: i64 = products
                    .iter()
                    .filter(|p| p.is_applied())
                    .map(|p| p.quantity)
                    .sum();
                prop_assert_eq!(result.total_quantity_moved, moved);

                prop_assert_eq!(result.is_applied(), applied == products.len());

                // Partial always means at least one decline happened.
                if result.outcome == AdjustmentOutcome::Partial {
                    prop_assert!(applied < products.len());
                }
            }
        }
    }
}
