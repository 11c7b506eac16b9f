//! Domain event publishing.
//!
//! Services hand committed events to an [`EventPublisher`]. Delivery is best
//! effort: a failed publish is logged and never fails the request that
//! produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;
use crate::{EcommerceError, Result};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Writes each event as a structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        info!(subject = %event.subject(), ?event, "domain event");
        Ok(())
    }
}

/// Publishes JSON payloads to NATS on `<prefix>.<aggregate>.<event>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub const DEFAULT_PREFIX: &'static str = "ecommerce";

    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| EcommerceError::Config(format!("cannot connect to NATS at {}: {}", url, e)))?;
        Ok(Self::new(client, Self::DEFAULT_PREFIX))
    }

    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let subject = format!("{}.{}", self.prefix, event.subject());
        let payload = serde_json::to_vec(event).map_err(|e| EcommerceError::Internal(format!("event serialization failed: {}", e)))?;
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| EcommerceError::Internal(format!("NATS publish failed: {}", e)))
    }
}

/// Publishes `events` in order, logging failures.
pub async fn publish_all(publisher: &Arc<dyn EventPublisher>, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            warn!(subject = %event.subject(), error = %e, "failed to publish domain event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use crate::domain::value_objects::Money;
    use uuid::Uuid;

    #[test]
    fn test_event_subject_and_payload() {
        let order_id = Uuid::new_v4();
        let event = DomainEvent::Order(OrderEvent::Placed { order_id, user_id: Uuid::new_v4(), total: Money::from_cents(1300).unwrap() });
        assert_eq!(event.subject(), "order.placed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "order");
        assert_eq!(json["event"]["type"], "placed");
        assert_eq!(json["event"]["total"], "13.00");
    }
}
