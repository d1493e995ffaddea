//! Shared types for the commerce services.
//!
//! This crate provides the typed identifiers and value types used across
//! the coordination layer and the order/catalog domain:
//! - UUID-backed entity identifiers
//! - ProductId (SKU string)
//! - Money in integer cents
//! - Version for optimistic concurrency

pub mod ids;
pub mod money;
pub mod version;

pub use ids::{CustomerId, MessageId, OrderId, PaymentId, ProductId, PromotionId, UserId};
pub use money::Money;
pub use version::Version;
