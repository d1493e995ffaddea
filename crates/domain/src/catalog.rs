//! Catalog service: product CRUD guarded by the distributed mutex, with
//! cache-aside reads.
//!
//! Creation under a barcode takes `lock:product:create:{barcode}` so two
//! concurrent requests cannot register the same barcode twice. Reads go
//! through the cache first; every mutation invalidates the affected keys
//! so staleness is bounded by one generation. Cache failures degrade to
//! repository reads and never fail the request.

use std::sync::Arc;
use std::time::Duration;

use cache::{Cache, CacheExt, keys};
use chrono::{DateTime, Utc};
use common::{Money, ProductId, Version};
use dist_lock::DistributedMutex;
use serde::{Deserialize, Serialize};

use crate::repository::ProductRepository;
use crate::DomainError;

/// Lease on the creation lock; bounds hold time if this instance dies
/// mid-create.
const CREATE_LOCK_LEASE: Duration = Duration::from_secs(10);

/// How long a second creator waits before reporting a conflict.
const CREATE_LOCK_WAIT: Duration = Duration::from_secs(3);

/// Stock level at or below which a product counts as low stock.
const LOW_STOCK_THRESHOLD: i64 = 10;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// SKU, assigned by the caller.
    pub id: ProductId,
    pub name: String,
    /// Natural business key; creation is serialized per barcode.
    pub barcode: Option<String>,
    pub price: Money,
    pub unit: String,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, owned by the repository.
    pub version: Version,
}

/// Fields for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub barcode: Option<String>,
    pub price: Money,
    pub unit: Option<String>,
}

/// Mutable fields of an existing product.
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub name: String,
    pub barcode: Option<String>,
    pub price: Money,
    pub unit: String,
}

/// Aggregated catalog figures, served from the short-TTL stats key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStats {
    pub total_products: usize,
    /// Sum of price times last known stock quantity.
    pub total_inventory_value: Money,
    pub low_stock_products: usize,
    pub out_of_stock_products: usize,
}

/// Product catalog operations.
pub struct CatalogService<R: ProductRepository> {
    repo: Arc<R>,
    cache: Arc<dyn Cache>,
    mutex: DistributedMutex,
    lock_lease: Duration,
    lock_wait: Duration,
}

impl<R: ProductRepository> CatalogService<R> {
    /// Creates a catalog over the given repository, cache, and mutex.
    pub fn new(repo: Arc<R>, cache: Arc<dyn Cache>, mutex: DistributedMutex) -> Self {
        Self {
            repo,
            cache,
            mutex,
            lock_lease: CREATE_LOCK_LEASE,
            lock_wait: CREATE_LOCK_WAIT,
        }
    }

    /// Overrides the creation-lock lease and wait window.
    pub fn with_lock_params(mut self, lease: Duration, wait: Duration) -> Self {
        self.lock_lease = lease;
        self.lock_wait = wait;
        self
    }

    /// Creates a product.
    ///
    /// When a barcode is supplied the critical section runs under the
    /// per-barcode creation lock; a timeout waiting for it surfaces as
    /// [`DomainError::Conflict`] ("in progress elsewhere, retry later").
    #[tracing::instrument(skip(self, new), fields(sku = %new.id))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, DomainError> {
        let Some(barcode) = new.barcode.clone() else {
            return self.create_unlocked(new).await;
        };

        let resource = format!("product:create:{barcode}");
        let guard = self
            .mutex
            .acquire(&resource, self.lock_lease, self.lock_wait)
            .await
            .map_err(|e| DomainError::DependencyFailure(format!("lock store: {e}")))?
            .ok_or_else(|| {
                DomainError::Conflict(format!(
                    "creation for barcode {barcode} is already running"
                ))
            })?;

        let result = self.create_unlocked(new).await;
        if let Err(e) = guard.release().await {
            tracing::warn!(barcode = %barcode, error = %e, "failed to release creation lock");
        }
        result
    }

    async fn create_unlocked(&self, new: NewProduct) -> Result<Product, DomainError> {
        if let Some(barcode) = &new.barcode
            && self.repo.get_by_barcode(barcode).await?.is_some()
        {
            return Err(DomainError::Validation(format!(
                "barcode {barcode} is already registered"
            )));
        }

        let product = Product {
            id: new.id,
            name: new.name,
            barcode: new.barcode,
            price: new.price,
            unit: new.unit.unwrap_or_else(|| "pcs".to_string()),
            created_at: Utc::now(),
            version: Version::initial(),
        };
        self.repo.insert(product.clone()).await?;

        self.invalidate(&[keys::PRODUCTS_ALL, keys::PRODUCTS_STATS]).await;
        metrics::counter!("products_created_total").increment(1);
        Ok(product)
    }

    /// Loads a product, cache first.
    pub async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, DomainError> {
        let key = keys::product(id);
        match self.cache.get_json::<Product>(&key).await {
            Ok(Some(product)) => return Ok(Some(product)),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss"),
        }

        let Some(product) = self.repo.get(id).await? else {
            return Ok(None);
        };
        if let Err(e) = self
            .cache
            .set_json(&key, &product, Some(keys::ENTITY_TTL))
            .await
        {
            tracing::warn!(key = %key, error = %e, "cache populate failed");
        }
        Ok(Some(product))
    }

    /// Lists all products, cache first.
    pub async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        match self.cache.get_json::<Vec<Product>>(keys::PRODUCTS_ALL).await {
            Ok(Some(products)) => return Ok(products),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "cache read failed, treating as miss"),
        }

        let products = self.repo.list().await?;
        if let Err(e) = self
            .cache
            .set_json(keys::PRODUCTS_ALL, &products, Some(keys::LIST_TTL))
            .await
        {
            tracing::warn!(error = %e, "cache populate failed");
        }
        Ok(products)
    }

    /// Replaces the mutable fields of a product and invalidates its
    /// cached views.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        id: &ProductId,
        update: ProductUpdate,
    ) -> Result<Product, DomainError> {
        let mut product = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("product {id} not found")))?;

        product.name = update.name;
        product.barcode = update.barcode;
        product.price = update.price;
        product.unit = update.unit;

        product.version = self.repo.save(&product).await?;

        let key = keys::product(id);
        self.invalidate(&[&key, keys::PRODUCTS_ALL, keys::PRODUCTS_STATS]).await;
        Ok(product)
    }

    /// Deletes a product and invalidates its cached views.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), DomainError> {
        if !self.repo.delete(id).await? {
            return Err(DomainError::not_found(format!("product {id} not found")));
        }

        let key = keys::product(id);
        self.invalidate(&[&key, keys::PRODUCTS_ALL, keys::PRODUCTS_STATS]).await;
        Ok(())
    }

    /// Returns the last stock quantity seen for a product on the bus, if
    /// any is cached.
    pub async fn inventory_quantity(&self, id: &ProductId) -> Option<i64> {
        match self.cache.get(&keys::product_inventory(id)).await {
            Ok(value) => value.and_then(|raw| raw.parse().ok()),
            Err(e) => {
                tracing::warn!(%id, error = %e, "inventory cache read failed");
                None
            }
        }
    }

    /// Aggregates catalog statistics, cache first.
    pub async fn product_stats(&self) -> Result<ProductStats, DomainError> {
        match self.cache.get_json::<ProductStats>(keys::PRODUCTS_STATS).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "cache read failed, treating as miss"),
        }

        let products = self.repo.list().await?;
        let mut total_inventory_value = Money::zero();
        let mut low_stock_products = 0;
        let mut out_of_stock_products = 0;

        for product in &products {
            let Some(quantity) = self.inventory_quantity(&product.id).await else {
                continue;
            };
            total_inventory_value += Money::from_cents(product.price.cents() * quantity);
            if quantity <= LOW_STOCK_THRESHOLD {
                low_stock_products += 1;
            }
            if quantity == 0 {
                out_of_stock_products += 1;
            }
        }

        let stats = ProductStats {
            total_products: products.len(),
            total_inventory_value,
            low_stock_products,
            out_of_stock_products,
        };
        if let Err(e) = self
            .cache
            .set_json(keys::PRODUCTS_STATS, &stats, Some(keys::LIST_TTL))
            .await
        {
            tracing::warn!(error = %e, "cache populate failed");
        }
        Ok(stats)
    }

    async fn invalidate(&self, cache_keys: &[&str]) {
        for key in cache_keys {
            if let Err(e) = self.cache.remove(key).await {
                tracing::warn!(key = %key, error = %e, "cache invalidation failed");
            }
        }
    }
}
