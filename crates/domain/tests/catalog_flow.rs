//! Catalog flow over the full coordination stack: creation behind the
//! distributed mutex, cache-aside reads, and inventory events arriving
//! through the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use cache::{Cache, InMemoryCache, keys};
use chrono::Utc;
use common::{Money, ProductId};
use dist_lock::{DistributedMutex, InMemoryLockStore, LockStore};
use domain::{
    CatalogService, DomainError, INVENTORY_EXCHANGE, INVENTORY_UPDATED_KEY,
    InMemoryProductRepository, InventoryUpdated, NewProduct, UpdateType,
    subscribe_inventory_updates,
};
use event_bus::{EventBus, EventBusExt, InMemoryEventBus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct Stack {
    catalog: Arc<CatalogService<InMemoryProductRepository>>,
    cache: Arc<InMemoryCache>,
    bus: InMemoryEventBus,
}

async fn stack() -> Stack {
    init_tracing();
    let repo = Arc::new(InMemoryProductRepository::new());
    let cache = Arc::new(InMemoryCache::new());
    let locks: Arc<dyn LockStore> = Arc::new(InMemoryLockStore::new());
    let catalog = Arc::new(CatalogService::new(
        repo,
        Arc::clone(&cache) as Arc<dyn Cache>,
        DistributedMutex::new(locks),
    ));

    let bus = InMemoryEventBus::with_prefetch(1);
    subscribe_inventory_updates(&bus, Arc::clone(&cache) as Arc<dyn Cache>)
        .await
        .unwrap();

    Stack { catalog, cache, bus }
}

fn new_product(sku: &str, barcode: &str, cents: i64) -> NewProduct {
    NewProduct {
        id: ProductId::new(sku),
        name: format!("product {sku}"),
        barcode: Some(barcode.to_string()),
        price: Money::from_cents(cents),
        unit: None,
    }
}

fn inventory_event(sku: &str, old: i64, new: i64) -> InventoryUpdated {
    InventoryUpdated {
        product_id: ProductId::new(sku),
        old_quantity: old,
        new_quantity: new,
        change_amount: new - old,
        update_type: UpdateType::Set,
        updated_at: Utc::now(),
        reason: None,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn concurrent_creation_of_one_barcode_yields_a_single_product() {
    let stack = stack().await;
    let catalog = &stack.catalog;

    let (a, b) = tokio::join!(
        catalog.create_product(new_product("SKU-A", "850001", 1000)),
        catalog.create_product(new_product("SKU-B", "850001", 2000)),
    );

    // Exactly one creation wins; the loser sees a duplicate-barcode
    // rejection (or a lock conflict if it gave up waiting).
    let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 1);
    assert_eq!(catalog.list_products().await.unwrap().len(), 1);

    for result in [a, b] {
        if let Err(e) = result {
            assert!(matches!(
                e,
                DomainError::Validation(_) | DomainError::Conflict(_)
            ));
        }
    }
}

#[tokio::test]
async fn inventory_event_flows_into_cache_and_stats() {
    let stack = stack().await;
    let product = stack
        .catalog
        .create_product(new_product("SKU-1", "850001", 10_00))
        .await
        .unwrap();

    stack
        .bus
        .publish_json(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            &inventory_event("SKU-1", 0, 25),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(stack.catalog.inventory_quantity(&product.id).await, Some(25));

    let stats = stack.catalog.product_stats().await.unwrap();
    assert_eq!(stats.total_products, 1);
    assert_eq!(stats.total_inventory_value, Money::from_cents(25_000));
    assert_eq!(stats.out_of_stock_products, 0);

    // A later event invalidates the cached stats view.
    stack
        .bus
        .publish_json(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            &inventory_event("SKU-1", 25, 0),
        )
        .await
        .unwrap();
    settle().await;

    let stats = stack.catalog.product_stats().await.unwrap();
    assert_eq!(stats.out_of_stock_products, 1);
    assert_eq!(stats.total_inventory_value, Money::zero());
}

#[tokio::test]
async fn unrelated_routing_keys_are_ignored() {
    let stack = stack().await;
    stack
        .catalog
        .create_product(new_product("SKU-1", "850001", 10_00))
        .await
        .unwrap();

    stack
        .bus
        .publish_json(
            INVENTORY_EXCHANGE,
            "inventory.deleted",
            &inventory_event("SKU-1", 5, 0),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        stack
            .catalog
            .inventory_quantity(&ProductId::new("SKU-1"))
            .await,
        None
    );
}

#[tokio::test]
async fn redelivered_event_applies_once() {
    let stack = stack().await;
    stack
        .catalog
        .create_product(new_product("SKU-1", "850001", 10_00))
        .await
        .unwrap();

    // Same business fact published twice with the same message id, as a
    // broker redelivery would look.
    let event = inventory_event("SKU-1", 0, 25);
    let envelope = event_bus::Envelope::new(
        INVENTORY_EXCHANGE,
        INVENTORY_UPDATED_KEY,
        serde_json::to_value(&event).unwrap(),
    );
    let handler = domain::InventoryUpdatedHandler::new(
        Arc::clone(&stack.cache) as Arc<dyn Cache>
    );

    event_bus::EventHandler::handle(&handler, envelope.clone())
        .await
        .unwrap();
    event_bus::EventHandler::handle(&handler, envelope)
        .await
        .unwrap();

    // Observable state equals a single application.
    assert_eq!(
        stack
            .catalog
            .inventory_quantity(&ProductId::new("SKU-1"))
            .await,
        Some(25)
    );
    let seen = stack.cache.set_members(keys::INVENTORY_SEEN).await.unwrap();
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn malformed_event_is_dead_lettered_and_later_events_flow() {
    let stack = stack().await;
    stack
        .catalog
        .create_product(new_product("SKU-1", "850001", 10_00))
        .await
        .unwrap();

    stack
        .bus
        .publish(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            serde_json::json!({"productId": "SKU-1"}),
        )
        .await
        .unwrap();
    stack
        .bus
        .publish_json(
            INVENTORY_EXCHANGE,
            INVENTORY_UPDATED_KEY,
            &inventory_event("SKU-1", 0, 7),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(stack.bus.dead_letters().await.len(), 1);
    assert_eq!(
        stack
            .catalog
            .inventory_quantity(&ProductId::new("SKU-1"))
            .await,
        Some(7)
    );
}
