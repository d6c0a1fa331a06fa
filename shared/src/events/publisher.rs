// ============================================================================
// OLYMPUS CLOUD - EVENT PUBLISHER
// ============================================================================
// Module: shared/src/events/publisher.rs
// Description: Redis-based event publishing for cross-service notification
// Date: 2025-01-19
// ============================================================================

use super::{DomainEvent, EventConfig};
use redis::aio::ConnectionManager;
use redis::RedisError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Event publishing errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event too large: {size} bytes exceeds limit of {limit}")]
    EventTooLarge { size: usize, limit: usize },
}

/// Redis-backed publisher for cross-service domain event notification.
///
/// This broadcasts events to other services over pub/sub and keeps a
/// per-aggregate stream for replay. It is not the durable audit trail -
/// that lives in the relational event journal, written in the same
/// transaction as the mutation it describes.
pub struct EventPublisher {
    redis: ConnectionManager,
    config: EventConfig,
    dead_letter_queue: Arc<Mutex<VecDeque<DomainEvent>>>,
    published_count: Arc<AtomicU64>,
    failed_count: Arc<AtomicU64>,
}

impl EventPublisher {
    pub async fn new(config: EventConfig) -> Result<Self, PublishError> {
        let client = redis::Client::open(config.redis_url.clone())?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self {
            redis,
            config,
            dead_letter_queue: Arc::new(Mutex::new(VecDeque::new())),
            published_count: Arc::new(AtomicU64::new(0)),
            failed_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Publish a single domain event, retrying with backoff up to `max_retries`.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    pub async fn publish(&mut self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        if payload.len() > 1_048_576 {
            return Err(PublishError::EventTooLarge {
                size: payload.len(),
                limit: 1_048_576,
            });
        }

        let mut attempt = 0;
        loop {
            match self.publish_once(event, &payload).await {
                Ok(()) => {
                    self.published_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "event publish failed, retrying");
                    sleep(self.config.retry_delay * attempt).await;
                }
                Err(e) => {
                    self.failed_count.fetch_add(1, Ordering::Relaxed);
                    if self.config.enable_dead_letter_queue {
                        self.dead_letter_queue.lock().await.push_back(event.clone());
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn publish_once(&mut self, event: &DomainEvent, payload: &[u8]) -> Result<(), PublishError> {
        let topic = event.topic();
        redis::cmd("PUBLISH")
            .arg(&topic)
            .arg(payload)
            .query_async::<_, i64>(&mut self.redis)
            .await?;

        let stream_name = event.stream_name();
        redis::cmd("XADD")
            .arg(&stream_name)
            .arg("*")
            .arg("event")
            .arg(payload)
            .arg("type")
            .arg(&event.event_type)
            .arg("occurred_at")
            .arg(event.occurred_at.timestamp())
            .query_async::<_, String>(&mut self.redis)
            .await?;

        debug!(topic = %topic, "published domain event");
        Ok(())
    }

    pub async fn publish_batch(&mut self, events: &[DomainEvent]) -> Result<(), PublishError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    pub fn published_count(&self) -> u64 {
        self.published_count.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub async fn dead_letter_queue_depth(&self) -> usize {
        self.dead_letter_queue.lock().await.len()
    }
}
