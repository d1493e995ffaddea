//! Namespaced cache keys and their TTL policy.
//!
//! Aggregate/list views use a short TTL since they go stale on any write;
//! single-entity views live longer and are invalidated explicitly.

use std::time::Duration;

use common::ProductId;

/// TTL for single-entity views.
pub const ENTITY_TTL: Duration = Duration::from_secs(600);

/// TTL for aggregate and list views.
pub const LIST_TTL: Duration = Duration::from_secs(60);

/// Key for the full product list.
pub const PRODUCTS_ALL: &str = "products:all";

/// Key for the catalog statistics view.
pub const PRODUCTS_STATS: &str = "products:stats";

/// Key for the set of already-processed inventory message ids.
pub const INVENTORY_SEEN: &str = "inventory:events:seen";

/// Key for a single product.
pub fn product(id: &ProductId) -> String {
    format!("product:{id}")
}

/// Key for a product's last known stock quantity.
pub fn product_inventory(id: &ProductId) -> String {
    format!("product:inventory:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        let id = ProductId::new("SKU-9");
        assert_eq!(product(&id), "product:SKU-9");
        assert_eq!(product_inventory(&id), "product:inventory:SKU-9");
    }
}
