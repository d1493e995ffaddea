//! Business core of the commerce backend.
//!
//! This crate holds the consumers of the coordination layer:
//! - Order lifecycle state machine (create, accrue payments, cancel)
//! - Promotion validation and usage counting
//! - Catalog service: lock-guarded product creation and cache-aside reads
//! - Inventory event consumption from the bus
//! - Resilience-wrapped product price lookup
//!
//! Persistence is abstract: repositories offer atomic get-by-id and a
//! versioned save, and services reload-then-mutate so concurrent writers
//! cannot lose updates.

pub mod catalog;
pub mod error;
pub mod inventory;
pub mod lookup;
pub mod order;
pub mod promotion;
pub mod repository;

pub use catalog::{CatalogService, NewProduct, Product, ProductStats, ProductUpdate};
pub use error::DomainError;
pub use inventory::{
    INVENTORY_EXCHANGE, INVENTORY_UPDATED_KEY, InventoryUpdated, InventoryUpdatedHandler,
    UpdateType, subscribe_inventory_updates,
};
pub use lookup::{HttpProductLookup, InMemoryProductLookup, ProductLookup, ProductQuote};
pub use order::{
    Caller, CreateOrderRequest, Order, OrderItem, OrderLine, OrderService, OrderStatus,
    OrderSummary, Payment, PaymentMethod,
};
pub use promotion::{
    DiscountType, NewPromotion, Promotion, PromotionEngine, PromotionStatus, PromotionUpdate,
    PromotionValidation,
};
pub use repository::{
    InMemoryOrderRepository, InMemoryProductRepository, InMemoryPromotionRepository,
    OrderRepository, ProductRepository, PromotionRepository,
};
