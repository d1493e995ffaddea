//! Repository seams for the business core.
//!
//! Persistence mapping lives outside this crate; these traits are the
//! whole contract: atomic get-by-id (children included) plus a durable
//! insert and a version-checked save. The in-memory implementations back
//! the test suites and mirror the semantics a database-backed
//! implementation must provide.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, PromotionId, Version};
use tokio::sync::RwLock;

use crate::catalog::Product;
use crate::order::Order;
use crate::promotion::Promotion;
use crate::DomainError;

/// Storage for orders, including their items and payments.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order. Fails if the id already exists.
    async fn insert(&self, order: Order) -> Result<(), DomainError>;

    /// Loads an order with its children.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, DomainError>;

    /// Persists a mutated order.
    ///
    /// The stored version must equal `order.version`; on success the
    /// stored entity carries the next version. A mismatch means a
    /// concurrent writer won and the caller must reload and retry.
    async fn save(&self, order: &Order) -> Result<Version, DomainError>;

    /// Returns all orders (the calling service applies scoping).
    async fn list(&self) -> Result<Vec<Order>, DomainError>;
}

/// Storage for promotions.
#[async_trait]
pub trait PromotionRepository: Send + Sync {
    /// Persists a new promotion. Fails if the code is already taken.
    async fn insert(&self, promotion: Promotion) -> Result<(), DomainError>;

    /// Loads a promotion by id.
    async fn get(&self, id: PromotionId) -> Result<Option<Promotion>, DomainError>;

    /// Loads a promotion by its unique code.
    async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, DomainError>;

    /// Version-checked save, as [`OrderRepository::save`].
    async fn save(&self, promotion: &Promotion) -> Result<Version, DomainError>;

    /// Returns all promotions.
    async fn list(&self) -> Result<Vec<Promotion>, DomainError>;
}

/// Storage for catalog products.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Persists a new product. Fails if the SKU already exists.
    async fn insert(&self, product: Product) -> Result<(), DomainError>;

    /// Loads a product by SKU.
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, DomainError>;

    /// Loads a product by barcode.
    async fn get_by_barcode(&self, barcode: &str) -> Result<Option<Product>, DomainError>;

    /// Version-checked save, as [`OrderRepository::save`].
    async fn save(&self, product: &Product) -> Result<Version, DomainError>;

    /// Deletes a product. Returns true if it existed.
    async fn delete(&self, id: &ProductId) -> Result<bool, DomainError>;

    /// Returns all products.
    async fn list(&self) -> Result<Vec<Product>, DomainError>;
}

/// In-memory order repository for testing.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, mut order: Order) -> Result<(), DomainError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(DomainError::ConcurrencyConflict {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        order.version = Version::initial();
        orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &Order) -> Result<Version, DomainError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| DomainError::not_found(format!("order {} not found", order.id)))?;

        if stored.version != order.version {
            return Err(DomainError::ConcurrencyConflict {
                entity: "order",
                id: order.id.to_string(),
            });
        }

        let mut updated = order.clone();
        updated.version = order.version.next();
        let version = updated.version;
        *stored = updated;
        Ok(version)
    }

    async fn list(&self) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

/// In-memory promotion repository for testing.
#[derive(Clone, Default)]
pub struct InMemoryPromotionRepository {
    promotions: Arc<RwLock<HashMap<PromotionId, Promotion>>>,
}

impl InMemoryPromotionRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromotionRepository for InMemoryPromotionRepository {
    async fn insert(&self, mut promotion: Promotion) -> Result<(), DomainError> {
        let mut promotions = self.promotions.write().await;
        if promotions.values().any(|p| p.code == promotion.code) {
            return Err(DomainError::Validation(format!(
                "promotion code {} already exists",
                promotion.code
            )));
        }
        promotion.version = Version::initial();
        promotions.insert(promotion.id, promotion);
        Ok(())
    }

    async fn get(&self, id: PromotionId) -> Result<Option<Promotion>, DomainError> {
        Ok(self.promotions.read().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, DomainError> {
        Ok(self
            .promotions
            .read()
            .await
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn save(&self, promotion: &Promotion) -> Result<Version, DomainError> {
        let mut promotions = self.promotions.write().await;
        let stored = promotions.get_mut(&promotion.id).ok_or_else(|| {
            DomainError::not_found(format!("promotion {} not found", promotion.code))
        })?;

        if stored.version != promotion.version {
            return Err(DomainError::ConcurrencyConflict {
                entity: "promotion",
                id: promotion.id.to_string(),
            });
        }

        let mut updated = promotion.clone();
        updated.version = promotion.version.next();
        let version = updated.version;
        *stored = updated;
        Ok(version)
    }

    async fn list(&self) -> Result<Vec<Promotion>, DomainError> {
        Ok(self.promotions.read().await.values().cloned().collect())
    }
}

/// In-memory product repository for testing.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn insert(&self, mut product: Product) -> Result<(), DomainError> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(DomainError::Validation(format!(
                "product {} already exists",
                product.id
            )));
        }
        product.version = Version::initial();
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get(&self, id: &ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn get_by_barcode(&self, barcode: &str) -> Result<Option<Product>, DomainError> {
        Ok(self
            .products
            .read()
            .await
            .values()
            .find(|p| p.barcode.as_deref() == Some(barcode))
            .cloned())
    }

    async fn save(&self, product: &Product) -> Result<Version, DomainError> {
        let mut products = self.products.write().await;
        let stored = products.get_mut(&product.id).ok_or_else(|| {
            DomainError::not_found(format!("product {} not found", product.id))
        })?;

        if stored.version != product.version {
            return Err(DomainError::ConcurrencyConflict {
                entity: "product",
                id: product.id.to_string(),
            });
        }

        let mut updated = product.clone();
        updated.version = product.version.next();
        let version = updated.version;
        *stored = updated;
        Ok(version)
    }

    async fn delete(&self, id: &ProductId) -> Result<bool, DomainError> {
        Ok(self.products.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Product>, DomainError> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, UserId};
    use crate::order::OrderItem;

    fn sample_order() -> Order {
        Order::create(
            UserId::new(),
            None,
            None,
            Money::zero(),
            vec![OrderItem::new("SKU-1", 1, Money::from_cents(1000))],
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        let id = order.id;

        repo.insert(order).await.unwrap();

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.version, Version::initial());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();

        repo.insert(order.clone()).await.unwrap();
        let result = repo.insert(order).await;
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        let id = order.id;
        repo.insert(order).await.unwrap();

        let mut loaded = repo.get(id).await.unwrap().unwrap();
        loaded.cancel().unwrap();
        let version = repo.save(&loaded).await.unwrap();

        assert_eq!(version, Version::initial().next());
        let reloaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, version);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        let id = order.id;
        repo.insert(order).await.unwrap();

        // Two writers load the same version.
        let mut first = repo.get(id).await.unwrap().unwrap();
        let mut second = repo.get(id).await.unwrap().unwrap();

        first.cancel().unwrap();
        repo.save(&first).await.unwrap();

        second.cancel().unwrap();
        let result = repo.save(&second).await;
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_missing_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        let result = repo.save(&order).await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }
}
