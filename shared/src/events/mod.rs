// ============================================================================
// OLYMPUS CLOUD - EVENT SYSTEM FOUNDATION
// ============================================================================
// Module: shared/src/events/mod.rs
// Description: Domain event definitions and event-driven architecture
// Date: 2025-01-18
// ============================================================================

pub mod publisher;
pub mod types;

pub use publisher::{EventPublisher, PublishError};
pub use types::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Base domain event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event metadata for context and tracing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub source_service: String,
    pub event_source: String, // "api", "background_job", "system"
    pub trace_id: Option<String>,
}

impl DomainEvent {
    /// Create a new domain event builder
    pub fn builder(
        event_type: String,
        aggregate_id: Uuid,
        aggregate_type: String,
    ) -> DomainEventBuilder {
        DomainEventBuilder {
            event_type,
            aggregate_id,
            aggregate_type,
            data: serde_json::Value::Null,
            metadata: EventMetadata {
                user_id: None,
                correlation_id: Uuid::new_v4(),
                causation_id: None,
                source_service: "rental-engine".to_string(),
                event_source: "api".to_string(),
                trace_id: None,
            },
            version: 1,
        }
    }

    /// Get event stream name for this event
    pub fn stream_name(&self) -> String {
        format!("{}-{}", self.aggregate_type.to_lowercase(), self.aggregate_id)
    }

    /// Get event topic for pub/sub
    pub fn topic(&self) -> String {
        format!("events.{}.{}", self.aggregate_type.to_lowercase(), self.event_type)
    }
}

/// Builder for creating domain events
pub struct DomainEventBuilder {
    event_type: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    data: serde_json::Value,
    metadata: EventMetadata,
    version: i64,
}

impl DomainEventBuilder {
    /// Set event data
    pub fn data<T: Serialize>(mut self, data: T) -> crate::Result<Self> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    /// Set user context
    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.metadata.user_id = Some(user_id);
        self
    }

    /// Set correlation ID for request tracing
    pub fn correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.metadata.correlation_id = correlation_id;
        self
    }

    /// Set causation ID (previous event that caused this one)
    pub fn causation_id(mut self, causation_id: Uuid) -> Self {
        self.metadata.causation_id = Some(causation_id);
        self
    }

    /// Set source service
    pub fn source_service(mut self, service: String) -> Self {
        self.metadata.source_service = service;
        self
    }

    /// Set event source
    pub fn event_source(mut self, source: String) -> Self {
        self.metadata.event_source = source;
        self
    }

    /// Set trace ID for distributed tracing
    pub fn trace_id(mut self, trace_id: String) -> Self {
        self.metadata.trace_id = Some(trace_id);
        self
    }

    /// Set event version
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Build the domain event
    pub fn build(self) -> DomainEvent {
        DomainEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            data: self.data,
            metadata: self.metadata,
            version: self.version,
            occurred_at: Utc::now(),
        }
    }
}

/// Event publishing configuration
#[derive(Debug, Clone)]
pub struct EventConfig {
    pub redis_url: String,
    pub max_retries: u32,
    pub retry_delay: std::time::Duration,
    pub batch_size: usize,
    pub batch_timeout: std::time::Duration,
    pub enable_dead_letter_queue: bool,
    pub dead_letter_topic: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            max_retries: 3,
            retry_delay: std::time::Duration::from_millis(1000),
            batch_size: 100,
            batch_timeout: std::time::Duration::from_secs(5),
            enable_dead_letter_queue: true,
            dead_letter_topic: "events.dead_letter".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_creation() {
        let user_id = Uuid::new_v4();
        let aggregate_id = Uuid::new_v4();

        let event = DomainEvent::builder(
            "RentalCreated".to_string(),
            aggregate_id,
            "Rental".to_string(),
        )
        .user_id(user_id)
        .data(serde_json::json!({"customer_id": Uuid::new_v4()}))
        .unwrap()
        .build();

        assert_eq!(event.event_type, "RentalCreated");
        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.metadata.user_id, Some(user_id));
    }

    #[test]
    fn test_event_topics() {
        let event = DomainEvent::builder(
            "RentalCreated".to_string(),
            Uuid::new_v4(),
            "Rental".to_string(),
        )
        .build();

        assert_eq!(event.topic(), "events.rental.RentalCreated");
    }

    #[test]
    fn test_stream_name() {
        let aggregate_id = Uuid::new_v4();
        let event = DomainEvent::builder(
            "RentalCreated".to_string(),
            aggregate_id,
            "Rental".to_string(),
        )
        .build();

        assert_eq!(event.stream_name(), format!("rental-{}", aggregate_id));
    }
}
