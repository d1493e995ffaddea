use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::MessageId;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::{Envelope, EventBus, EventHandler, Result, error::BusError, routing_matches};

/// Default bound on unacknowledged in-flight messages per queue.
const DEFAULT_PREFETCH: usize = 10;

struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

struct Inner {
    bindings: Vec<Binding>,
    queues: HashMap<String, mpsc::UnboundedSender<Envelope>>,
    workers: Vec<JoinHandle<()>>,
    journal: Vec<Envelope>,
}

/// In-memory broker for testing and single-process use.
///
/// Implements the full delivery contract: topic-pattern routing, per-queue
/// prefetch-bounded handling, dead-lettering on handler failure, and a
/// journal of everything published for test introspection.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
    dead_letters: Arc<Mutex<Vec<Envelope>>>,
    prefetch: usize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a broker with the default prefetch count.
    pub fn new() -> Self {
        Self::with_prefetch(DEFAULT_PREFETCH)
    }

    /// Creates a broker with a specific prefetch count.
    ///
    /// A prefetch of 1 serializes handling per queue, which keeps delivery
    /// order observable in tests.
    pub fn with_prefetch(prefetch: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                bindings: Vec::new(),
                queues: HashMap::new(),
                workers: Vec::new(),
                journal: Vec::new(),
            })),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            prefetch,
        }
    }

    /// Returns every message published so far.
    pub async fn journal(&self) -> Vec<Envelope> {
        self.inner.lock().await.journal.clone()
    }

    /// Returns the messages whose handlers failed.
    pub async fn dead_letters(&self) -> Vec<Envelope> {
        self.dead_letters.lock().await.clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId> {
        let envelope = Envelope::new(exchange, routing_key, payload);
        let message_id = envelope.message_id;

        let mut inner = self.inner.lock().await;
        inner.journal.push(envelope.clone());

        // One delivery per bound queue, even if several patterns match.
        let mut delivered: Vec<&str> = Vec::new();
        for binding in &inner.bindings {
            if binding.exchange == exchange
                && routing_matches(&binding.pattern, routing_key)
                && !delivered.contains(&binding.queue.as_str())
            {
                delivered.push(binding.queue.as_str());
            }
        }
        let delivered: Vec<String> = delivered.into_iter().map(String::from).collect();

        for queue in delivered {
            if let Some(sender) = inner.queues.get(&queue) {
                // Receiver dropped means the consumer was closed; the
                // journal still records the publish.
                let _ = sender.send(envelope.clone());
            }
        }

        metrics::counter!("bus_published_total").increment(1);
        Ok(message_id)
    }

    async fn subscribe(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.queues.contains_key(queue) {
            return Err(BusError::QueueInUse(queue.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.queues.insert(queue.to_string(), tx);
        inner.bindings.push(Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: routing_key.to_string(),
        });

        let worker = tokio::spawn(consume_loop(
            rx,
            handler,
            Arc::clone(&self.dead_letters),
            self.prefetch,
            queue.to_string(),
        ));
        inner.workers.push(worker);

        tracing::info!(queue, exchange, pattern = routing_key, "queue bound");
        Ok(())
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.queues.clear();
        for worker in inner.workers.drain(..) {
            worker.abort();
        }
    }
}

async fn consume_loop(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    handler: Arc<dyn EventHandler>,
    dead_letters: Arc<Mutex<Vec<Envelope>>>,
    prefetch: usize,
    queue: String,
) {
    let in_flight = Arc::new(Semaphore::new(prefetch));

    while let Some(envelope) = rx.recv().await {
        // Acquiring before spawning bounds in-flight work and keeps
        // task start order equal to delivery order.
        let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
            break;
        };

        let handler = Arc::clone(&handler);
        let dead_letters = Arc::clone(&dead_letters);
        let queue = queue.clone();

        tokio::spawn(async move {
            let message_id = envelope.message_id;
            match handler.handle(envelope.clone()).await {
                Ok(()) => {
                    metrics::counter!("bus_acked_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(
                        queue = %queue,
                        message_id = %message_id,
                        error = %e,
                        "handler failed, dead-lettering message"
                    );
                    metrics::counter!("bus_dead_lettered_total").increment(1);
                    dead_letters.lock().await.push(envelope);
                }
            }
            drop(permit);
        });
    }
}
