//! Consumption of inventory events published by the stock-owning service.
//!
//! The handler is idempotent under redelivery: message ids are recorded
//! in a cache set, and a duplicate delivery acknowledges without
//! reapplying. Even without the dedupe set the apply itself is a
//! last-writer-wins `set` of the new quantity.

use std::sync::Arc;

use async_trait::async_trait;
use cache::{Cache, keys};
use chrono::{DateTime, Utc};
use common::ProductId;
use event_bus::{Envelope, EventBus, EventHandler, HandlerError};
use serde::{Deserialize, Serialize};

/// Exchange carrying stock changes.
pub const INVENTORY_EXCHANGE: &str = "inventory";

/// Routing key for quantity updates.
pub const INVENTORY_UPDATED_KEY: &str = "inventory.updated";

/// Durable queue bound by this service.
const INVENTORY_QUEUE: &str = "catalog.inventory";

/// The kind of stock mutation the other service performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Set,
    Increment,
    Decrement,
}

/// Wire payload of `inventory.updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryUpdated {
    pub product_id: ProductId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub change_amount: i64,
    pub update_type: UpdateType,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Applies inventory updates to the local cache views.
pub struct InventoryUpdatedHandler {
    cache: Arc<dyn Cache>,
}

impl InventoryUpdatedHandler {
    /// Creates a handler writing through the given cache.
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for InventoryUpdatedHandler {
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        // Dedupe on message id; a redelivered message acks as a no-op.
        match self
            .cache
            .set_add(keys::INVENTORY_SEEN, &envelope.message_id.to_string())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(message_id = %envelope.message_id, "duplicate delivery skipped");
                metrics::counter!("inventory_updates_deduped_total").increment(1);
                return Ok(());
            }
            // Without the dedupe set the apply below is still
            // last-writer-wins on the same fact.
            Err(e) => tracing::warn!(error = %e, "dedupe set unavailable"),
        }

        let event: InventoryUpdated = envelope.payload_as()?;

        let key = keys::product_inventory(&event.product_id);
        if let Err(e) = self
            .cache
            .set(&key, &event.new_quantity.to_string(), Some(keys::ENTITY_TTL))
            .await
        {
            tracing::warn!(key = %key, error = %e, "inventory cache write failed");
        }
        if let Err(e) = self.cache.remove(keys::PRODUCTS_STATS).await {
            tracing::warn!(error = %e, "stats invalidation failed");
        }

        metrics::counter!("inventory_updates_applied_total").increment(1);
        tracing::debug!(
            product_id = %event.product_id,
            new_quantity = event.new_quantity,
            update_type = ?event.update_type,
            "inventory update applied"
        );
        Ok(())
    }
}

/// Binds the inventory queue and starts consuming updates.
pub async fn subscribe_inventory_updates(
    bus: &dyn EventBus,
    cache: Arc<dyn Cache>,
) -> event_bus::Result<()> {
    bus.subscribe(
        INVENTORY_QUEUE,
        INVENTORY_EXCHANGE,
        INVENTORY_UPDATED_KEY,
        Arc::new(InventoryUpdatedHandler::new(cache)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::InMemoryCache;

    fn updated(product: &str, new_quantity: i64) -> InventoryUpdated {
        InventoryUpdated {
            product_id: ProductId::new(product),
            old_quantity: 0,
            new_quantity,
            change_amount: new_quantity,
            update_type: UpdateType::Set,
            updated_at: Utc::now(),
            reason: None,
        }
    }

    fn envelope(event: &InventoryUpdated) -> Envelope {
        Envelope::new(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(updated("SKU-1", 5)).unwrap();
        assert!(json.get("productId").is_some());
        assert!(json.get("newQuantity").is_some());
        assert!(json.get("updateType").is_some());
        assert_eq!(json["updateType"], "set");
        // Absent reason is omitted entirely.
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_wire_payload_parses() {
        let raw = serde_json::json!({
            "productId": "SKU-9",
            "oldQuantity": 4,
            "newQuantity": 9,
            "changeAmount": 5,
            "updateType": "increment",
            "updatedAt": "2024-06-01T12:00:00Z",
            "reason": "restock"
        });
        let event: InventoryUpdated = serde_json::from_value(raw).unwrap();
        assert_eq!(event.update_type, UpdateType::Increment);
        assert_eq!(event.reason.as_deref(), Some("restock"));
    }

    #[tokio::test]
    async fn test_handler_writes_quantity_and_invalidates_stats() {
        let cache = Arc::new(InMemoryCache::new());
        cache.set(keys::PRODUCTS_STATS, "{}", None).await.unwrap();
        let handler = InventoryUpdatedHandler::new(Arc::clone(&cache) as Arc<dyn Cache>);

        let event = updated("SKU-1", 17);
        handler.handle(envelope(&event)).await.unwrap();

        let stored = cache
            .get(&keys::product_inventory(&event.product_id))
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("17"));
        assert!(!cache.exists(keys::PRODUCTS_STATS).await.unwrap());
    }

    #[tokio::test]
    async fn test_redelivery_is_a_noop() {
        let cache = Arc::new(InMemoryCache::new());
        let handler = InventoryUpdatedHandler::new(Arc::clone(&cache) as Arc<dyn Cache>);

        let event = updated("SKU-1", 17);
        let delivery = envelope(&event);

        handler.handle(delivery.clone()).await.unwrap();

        // Simulate outside interference so a reapply would be visible.
        let key = keys::product_inventory(&event.product_id);
        cache.set(&key, "999", None).await.unwrap();

        // Same message id again: applied-once semantics hold.
        handler.handle(delivery).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let cache = Arc::new(InMemoryCache::new());
        let handler = InventoryUpdatedHandler::new(Arc::clone(&cache) as Arc<dyn Cache>);

        let bad = Envelope::new(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            serde_json::json!({"productId": "SKU-1"}),
        );
        assert!(handler.handle(bad).await.is_err());
    }
}
