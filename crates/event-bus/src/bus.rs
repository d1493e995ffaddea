use std::sync::Arc;

use async_trait::async_trait;
use common::MessageId;
use serde::Serialize;

use crate::{Envelope, Result};

/// Error type returned by message handlers.
///
/// The bus only cares that handling failed; the concrete cause is logged
/// and the message dead-lettered.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A consumer callback for one queue.
///
/// Handlers run on the bus's delivery task, bounded in concurrency by the
/// prefetch count, and must be idempotent with respect to duplicate
/// delivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one delivery. `Ok` acknowledges and removes the message;
    /// `Err` dead-letters it.
    async fn handle(&self, envelope: Envelope) -> std::result::Result<(), HandlerError>;
}

/// Core trait for bus implementations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a persistent message to `exchange` under `routing_key`.
    ///
    /// The exchange is declared idempotently. Fire-and-forget: no delivery
    /// confirmation is exposed to the caller.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId>;

    /// Binds the durable queue `queue` to `exchange` under the topic
    /// pattern `routing_key` and starts delivering messages to `handler`.
    async fn subscribe(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;

    /// Stops consumer tasks. Publishing after close is implementation
    /// defined; consumers make no further deliveries.
    async fn close(&self);
}

/// Extension trait providing typed publishing on top of [`EventBus`].
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes `message` and publishes it.
    async fn publish_json<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<MessageId> {
        let payload = serde_json::to_value(message)?;
        self.publish(exchange, routing_key, payload).await
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}
