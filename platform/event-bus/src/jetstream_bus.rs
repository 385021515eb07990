//! NATS JetStream implementation of the EventBus trait.

use crate::{
    pattern, Acknowledge, BusError, BusMessage, BusResult, Delivery, EventBus, ExchangeConfig,
    QueueBinding,
};
use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

/// Map a dotted exchange name to a JetStream stream name
/// (`user.events` -> `USER_EVENTS`; stream names cannot contain dots).
pub fn stream_name(exchange: &str) -> String {
    exchange.replace('.', "_").to_uppercase()
}

/// Map a queue name to a durable consumer name
/// (`user.queue` -> `user-queue`; consumer names cannot contain dots).
pub fn durable_name(queue: &str) -> String {
    queue.replace('.', "-")
}

/// Production EventBus backed by NATS JetStream.
///
/// Exchanges are durable streams, queue bindings are durable pull consumers
/// with explicit acknowledgment and `max_ack_pending = 1`, so bindings and
/// undelivered messages survive a broker restart and each consumer processes
/// strictly one message at a time.
#[derive(Clone)]
pub struct JetStreamBus {
    context: jetstream::Context,
}

impl JetStreamBus {
    /// Wrap an already-connected NATS client.
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            context: jetstream::new(client),
        }
    }
}

#[async_trait]
impl EventBus for JetStreamBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        pattern::validate_subject(subject)?;

        // Awaiting the ack future means the stream has persisted the message.
        let ack = self
            .context
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        ack.await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn declare_exchange(&self, config: &ExchangeConfig) -> BusResult<()> {
        let stream_config = stream::Config {
            name: stream_name(&config.name),
            subjects: config.subjects.clone(),
            max_age: config.max_age,
            ..Default::default()
        };

        // get_or_create compares against the existing stream and fails on a
        // conflicting definition, which is exactly the redeclare contract.
        self.context
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| BusError::DeclareConflict(e.to_string()))?;

        Ok(())
    }

    async fn consume(&self, binding: &QueueBinding) -> BusResult<BoxStream<'static, Delivery>> {
        let filter_subjects = binding
            .patterns
            .iter()
            .map(|p| pattern::normalize(p))
            .collect::<BusResult<Vec<_>>>()?;

        let stream = self
            .context
            .get_stream(stream_name(&binding.exchange))
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let durable = durable_name(&binding.queue);
        let consumer_config = consumer::pull::Config {
            durable_name: Some(durable.clone()),
            filter_subjects,
            ack_policy: consumer::AckPolicy::Explicit,
            max_ack_pending: 1,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&durable, consumer_config)
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let deliveries = messages.filter_map(|item| async move {
            match item {
                Ok(msg) => {
                    let redelivered = msg.info().map(|info| info.delivered > 1).unwrap_or(false);
                    let message = BusMessage::new(msg.subject.to_string(), msg.payload.to_vec());
                    Some(Delivery::new(
                        message,
                        redelivered,
                        Box::new(JetStreamAcker { message: msg }),
                    ))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "jetstream delivery error, skipping");
                    None
                }
            }
        });

        Ok(deliveries.boxed())
    }
}

struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledge for JetStreamAcker {
    async fn ack(&mut self) -> BusResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }

    async fn nack(&mut self, requeue: bool) -> BusResult<()> {
        let kind = if requeue {
            AckKind::Nak(None)
        } else {
            AckKind::Term
        };
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEnvelope;
    use futures::StreamExt;

    #[test]
    fn stream_and_durable_names_are_broker_safe() {
        assert_eq!(stream_name("user.events"), "USER_EVENTS");
        assert_eq!(stream_name("auth.events"), "AUTH_EVENTS");
        assert_eq!(durable_name("user.queue"), "user-queue");
        assert_eq!(durable_name("audit-auth-events"), "audit-auth-events");
    }

    // Requires a NATS server with JetStream:
    //   docker run -p 4222:4222 nats:2.10-alpine -js
    #[tokio::test]
    #[ignore]
    async fn jetstream_round_trip() {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");
        let bus = JetStreamBus::new(client);

        bus.declare_exchange(&ExchangeConfig::new(
            "bustest.events",
            vec!["bustest.>".into()],
        ))
        .await
        .unwrap();

        let binding = QueueBinding::new(
            "bustest.queue",
            "bustest.events",
            vec!["bustest.*".into()],
        );
        let mut deliveries = bus.consume(&binding).await.unwrap();

        let envelope = EventEnvelope::new("bustest.created", crate::JsonMap::new());
        bus.publish("bustest.created", serde_json::to_vec(&envelope).unwrap())
            .await
            .unwrap();

        let delivery = tokio::time::timeout(std::time::Duration::from_secs(2), deliveries.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        let decoded = EventEnvelope::from_slice(&delivery.message.payload).unwrap();
        assert_eq!(decoded, envelope);
        delivery.ack().await.unwrap();
    }
}
