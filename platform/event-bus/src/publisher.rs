//! Durable event publisher used by the owning service's use cases.

use crate::{EventBus, EventEnvelope, BusError, BusResult};
use serde::Serialize;
use std::sync::Arc;

/// Serializes envelopes and publishes them with an at-least-once attempt.
///
/// On a transient failure the publish is retried exactly once (the
/// underlying client reconnects on its own); a second failure is surfaced to
/// the caller. Calling use cases log and swallow that error: the local
/// write the event describes has already committed and must not be undone,
/// so the client-facing operation never fails because an event could not be
/// emitted.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Publish an envelope under its routing key.
    ///
    /// # Errors
    ///
    /// Returns the final [`BusError`] after the single retry is exhausted.
    pub async fn publish<T: Serialize + Sync>(
        &self,
        subject: &str,
        envelope: &EventEnvelope<T>,
    ) -> BusResult<()> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        match self.bus.publish(subject, payload.clone()).await {
            Ok(()) => {
                tracing::debug!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    subject = %subject,
                    "event published"
                );
                Ok(())
            }
            Err(first) => {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    subject = %subject,
                    error = %first,
                    "publish failed, retrying once"
                );
                self.bus.publish(subject, payload).await.map_err(|e| {
                    tracing::error!(
                        event_id = %envelope.event_id,
                        subject = %subject,
                        error = %e,
                        "publish failed after retry"
                    );
                    e
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Delivery, ExchangeConfig, InMemoryBus, JsonMap, QueueBinding};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn publishes_through_the_bus() {
        let bus = Arc::new(InMemoryBus::new());
        bus.declare_exchange(&ExchangeConfig::new("user.events", vec!["user.>".into()]))
            .await
            .unwrap();

        let binding = QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]);
        let mut deliveries = bus.consume(&binding).await.unwrap();

        let publisher = EventPublisher::new(bus);
        let envelope = EventEnvelope::new("user.created", JsonMap::new()).with_user("u1");
        publisher.publish("user.created", &envelope).await.unwrap();

        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), deliveries.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let decoded = EventEnvelope::from_slice(&delivery.message.payload).unwrap();
        assert_eq!(decoded, envelope);
        delivery.ack().await.unwrap();
    }

    /// Bus that fails a configurable number of publishes before succeeding.
    struct FlakyBus {
        failures: AtomicU32,
        delegate: InMemoryBus,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                return Err(BusError::ConnectionError("broker unreachable".into()));
            }
            self.delegate.publish(subject, payload).await
        }

        async fn declare_exchange(&self, config: &ExchangeConfig) -> BusResult<()> {
            self.delegate.declare_exchange(config).await
        }

        async fn consume(
            &self,
            binding: &QueueBinding,
        ) -> BusResult<BoxStream<'static, Delivery>> {
            self.delegate.consume(binding).await
        }
    }

    #[tokio::test]
    async fn one_transient_failure_is_retried() {
        let delegate = InMemoryBus::new();
        delegate
            .declare_exchange(&ExchangeConfig::new("user.events", vec!["user.>".into()]))
            .await
            .unwrap();
        let binding = QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]);
        let mut deliveries = delegate.consume(&binding).await.unwrap();

        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(1),
            delegate,
        });
        let publisher = EventPublisher::new(bus);

        let envelope = EventEnvelope::new("user.created", JsonMap::new());
        publisher.publish("user.created", &envelope).await.unwrap();

        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), deliveries.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_failure_surfaces_to_caller() {
        let bus = Arc::new(FlakyBus {
            failures: AtomicU32::new(2),
            delegate: InMemoryBus::new(),
        });
        let publisher = EventPublisher::new(bus);

        let envelope = EventEnvelope::new("user.created", JsonMap::new());
        assert!(publisher.publish("user.created", &envelope).await.is_err());
    }
}
