//! Durable topic-based publish/subscribe.
//!
//! Publishing is fire-and-forget: messages are marked persistent, stamped
//! with a unique id, and routed by topic pattern to every bound queue.
//! Delivery is **at-least-once** - a handler that fails moves the message
//! to the dead-letter store without requeueing it for an immediate retry,
//! and a consumer restart redelivers whatever was never acknowledged.
//! Handlers must therefore be idempotent under duplicate delivery (dedupe
//! by message id or business key before applying effects).
//!
//! Ordering is guaranteed only within a single routing key on a single
//! queue; there is no global ordering across topics.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod redis;

pub use bus::{EventBus, EventBusExt, EventHandler, HandlerError};
pub use envelope::{Envelope, routing_matches};
pub use error::{BusError, Result};
pub use memory::InMemoryEventBus;
pub use self::redis::RedisStreamBus;
