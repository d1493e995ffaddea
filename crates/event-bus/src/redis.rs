//! Redis Streams bus backend.
//!
//! One stream per exchange (`bus:{exchange}`), one consumer group per
//! queue. Entries are appended with `XADD` (durable), read with
//! `XREADGROUP` in batches bounded by the prefetch count, and removed
//! from the pending list with `XACK` once a handler completes. A handler
//! failure moves the entry to `bus:{exchange}:dlq` before acking.
//!
//! Each consumer drains its own pending entries before reading new ones,
//! so messages that were delivered but never acknowledged (consumer
//! crash) are redelivered on restart - the at-least-once half of the
//! contract.
//!
//! Reads poll with a short interval instead of `BLOCK`: all handles share
//! one multiplexed connection, and a blocking read would stall publishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{BusError, Envelope, EventBus, EventHandler, Result, routing_matches};

const DEFAULT_PREFETCH: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const BACKOFF_ON_ERROR: Duration = Duration::from_secs(1);

fn stream_key(exchange: &str) -> String {
    format!("bus:{exchange}")
}

fn dead_letter_key(exchange: &str) -> String {
    format!("bus:{exchange}:dlq")
}

/// Redis Streams-backed bus.
#[derive(Clone)]
pub struct RedisStreamBus {
    conn: ConnectionManager,
    prefetch: usize,
    consumers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RedisStreamBus {
    /// Connects to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self {
            conn,
            prefetch: DEFAULT_PREFETCH,
            consumers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Connects using `REDIS_URL`, defaulting to a local instance.
    pub async fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::connect(&url).await
    }

    /// Overrides the per-queue prefetch count.
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => Ok(()),
            // Re-declaring an existing group is the idempotent case.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EventBus for RedisStreamBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId> {
        let envelope = Envelope::new(exchange, routing_key, payload);
        let fields: Vec<(&str, String)> = vec![
            ("message_id", envelope.message_id.to_string()),
            ("routing_key", envelope.routing_key.clone()),
            ("payload", serde_json::to_string(&envelope.payload)?),
            ("timestamp", envelope.timestamp.to_rfc3339()),
        ];

        let mut conn = self.conn.clone();
        let _entry_id: String = conn.xadd(stream_key(exchange), "*", &fields).await?;

        metrics::counter!("bus_published_total").increment(1);
        Ok(envelope.message_id)
    }

    async fn subscribe(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let stream = stream_key(exchange);
        let dlq = dead_letter_key(exchange);
        self.ensure_group(&stream, queue).await?;

        let worker = tokio::spawn(consume_loop(ConsumerContext {
            conn: self.conn.clone(),
            stream,
            dlq,
            group: queue.to_string(),
            // Stable name: a restarted consumer reclaims its own
            // pending entries.
            consumer: format!("{queue}-consumer"),
            pattern: routing_key.to_string(),
            handler,
            prefetch: self.prefetch,
        }));
        self.consumers.lock().await.push(worker);

        tracing::info!(queue, exchange, pattern = routing_key, "queue bound");
        Ok(())
    }

    async fn close(&self) {
        for worker in self.consumers.lock().await.drain(..) {
            worker.abort();
        }
    }
}

struct ConsumerContext {
    conn: ConnectionManager,
    stream: String,
    dlq: String,
    group: String,
    consumer: String,
    pattern: String,
    handler: Arc<dyn EventHandler>,
    prefetch: usize,
}

async fn consume_loop(ctx: ConsumerContext) {
    let mut conn = ctx.conn.clone();
    // Drain our own pending entries (delivered, never acked) before
    // moving on to new messages.
    let mut backlog = true;

    loop {
        let cursor = if backlog { "0" } else { ">" };
        let options = StreamReadOptions::default()
            .group(&ctx.group, &ctx.consumer)
            .count(ctx.prefetch);

        let reply: StreamReadReply = match conn
            .xread_options(&[ctx.stream.as_str()], &[cursor], &options)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(stream = %ctx.stream, error = %e, "stream read failed");
                tokio::time::sleep(BACKOFF_ON_ERROR).await;
                continue;
            }
        };

        let entries: Vec<StreamId> = reply.keys.into_iter().flat_map(|k| k.ids).collect();
        if entries.is_empty() {
            if backlog {
                backlog = false;
            } else {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            continue;
        }

        for entry in entries {
            if let Err(e) = process_entry(&mut conn, &ctx, &entry).await {
                tracing::warn!(
                    stream = %ctx.stream,
                    entry = %entry.id,
                    error = %e,
                    "failed to process stream entry"
                );
                tokio::time::sleep(BACKOFF_ON_ERROR).await;
            }
        }
    }
}

async fn process_entry(
    conn: &mut ConnectionManager,
    ctx: &ConsumerContext,
    entry: &StreamId,
) -> Result<()> {
    let routing_key: String = entry.get("routing_key").unwrap_or_default();

    // Routing is filtered consumer-side; entries for other patterns are
    // acknowledged untouched so they don't sit in the pending list.
    if !routing_matches(&ctx.pattern, &routing_key) {
        let _: i64 = conn.xack(&ctx.stream, &ctx.group, &[&entry.id]).await?;
        return Ok(());
    }

    let envelope = decode_entry(entry, &routing_key, &ctx.stream);
    let message_id = envelope.message_id;

    match ctx.handler.handle(envelope).await {
        Ok(()) => {
            metrics::counter!("bus_acked_total").increment(1);
        }
        Err(e) => {
            tracing::warn!(
                queue = %ctx.group,
                message_id = %message_id,
                error = %e,
                "handler failed, dead-lettering message"
            );
            metrics::counter!("bus_dead_lettered_total").increment(1);
            let fields: Vec<(&str, String)> = entry
                .map
                .iter()
                .filter_map(|(k, v)| {
                    redis::from_redis_value::<String>(v)
                        .ok()
                        .map(|s| (k.as_str(), s))
                })
                .collect();
            let _dlq_id: String = conn.xadd(&ctx.dlq, "*", &fields).await?;
        }
    }

    // Ack in both cases: a failed message lives on in the DLQ, not the
    // pending list.
    let _: i64 = conn.xack(&ctx.stream, &ctx.group, &[&entry.id]).await?;
    Ok(())
}

fn decode_entry(entry: &StreamId, routing_key: &str, stream: &str) -> Envelope {
    let message_id = entry
        .get::<String>("message_id")
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .map(MessageId::from_uuid)
        .unwrap_or_default();

    let payload = entry
        .get::<String>("payload")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(serde_json::Value::Null);

    let timestamp = entry
        .get::<String>("timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Envelope {
        exchange: stream.strip_prefix("bus:").unwrap_or(stream).to_string(),
        routing_key: routing_key.to_string(),
        message_id,
        payload,
        persistent: true,
        timestamp,
    }
}
