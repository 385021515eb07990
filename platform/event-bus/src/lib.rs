//! # Event Bus Abstraction
//!
//! Shared runtime capability for event-driven messaging between services.
//!
//! Every cross-service notification travels as an [`EventEnvelope`] published
//! to a topic exchange under a dot-namespaced routing key (`user.created`).
//! Downstream services declare durable queues bound to one or more routing
//! patterns and receive deliveries one at a time with **manual acknowledgment**:
//! a delivery stays on the queue until the consumer acks it, and a nack with
//! requeue puts it back for redelivery. That is the at-least-once contract the
//! rest of the platform builds on.
//!
//! ## Implementations
//!
//! - [`JetStreamBus`]: production implementation on NATS JetStream (durable
//!   streams as exchanges, durable consumers as queues)
//! - [`InMemoryBus`]: dev/test implementation with the same queue semantics
//!
//! Services pick one at startup via `BUS_TYPE` and only ever hold an
//! `Arc<dyn EventBus>`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, EventEnvelope, ExchangeConfig, InMemoryBus, QueueBinding};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//! bus.declare_exchange(&ExchangeConfig::new("user.events", vec!["user.>".into()])).await?;
//!
//! let envelope = EventEnvelope::new("user.created", serde_json::Map::new());
//! bus.publish("user.created", serde_json::to_vec(&envelope)?).await?;
//!
//! let binding = QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]);
//! let mut deliveries = bus.consume(&binding).await?;
//! while let Some(delivery) = deliveries.next().await {
//!     // ... apply the event ...
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

mod envelope;
mod inmemory_bus;
mod jetstream_bus;
pub mod pattern;
mod publisher;
pub mod retry;

pub use envelope::{validate_envelope, EventEnvelope, JsonMap};
pub use inmemory_bus::InMemoryBus;
pub use jetstream_bus::{durable_name, stream_name, JetStreamBus};
pub use publisher::EventPublisher;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/routing key this message was published under
    pub subject: String,
    /// The serialized envelope (raw bytes)
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
        }
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to queue: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject or pattern: {0}")]
    InvalidSubject(String),

    #[error("conflicting declaration: {0}")]
    DeclareConflict(String),

    #[error("acknowledge failed: {0}")]
    AckError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// A durable topic exchange.
///
/// On JetStream this becomes a durable stream capturing `subjects`; the
/// in-memory bus uses it to scope which queues can see a published subject.
/// Declaring the same exchange twice with identical parameters is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Dotted exchange name, e.g. `user.events`
    pub name: String,
    /// Subject space the exchange captures, e.g. `["user.>"]`
    pub subjects: Vec<String>,
    /// Retention for undelivered messages
    pub max_age: Duration,
}

impl ExchangeConfig {
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
            // 14 days, matching the platform stream defaults
            max_age: Duration::from_secs(60 * 60 * 24 * 14),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// A durable `(queue, exchange, patterns)` binding declared at consumer
/// startup.
///
/// Patterns use topic wildcards: `*` matches exactly one dot-separated word,
/// `#` matches zero or more, and the native `>` matches one or more.
/// Redeclaring an existing queue with identical parameters is a no-op;
/// redeclaring with different parameters is a [`BusError::DeclareConflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub patterns: Vec<String>,
}

impl QueueBinding {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        patterns: Vec<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            patterns,
        }
    }
}

/// Backend-specific acknowledgment for a single delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&mut self) -> BusResult<()>;
    async fn nack(&mut self, requeue: bool) -> BusResult<()>;
}

/// One in-flight delivery from a bound queue.
///
/// The consumer owns exactly one unacknowledged `Delivery` at a time
/// (prefetch 1) and must resolve it with [`Delivery::ack`] or
/// [`Delivery::nack`] before the next one is handed out.
pub struct Delivery {
    pub message: BusMessage,
    /// True when the broker has handed this message out before
    pub redelivered: bool,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(message: BusMessage, redelivered: bool, acker: Box<dyn Acknowledge>) -> Self {
        Self {
            message,
            redelivered,
            acker,
        }
    }

    /// Permanently remove the message from the queue.
    pub async fn ack(mut self) -> BusResult<()> {
        self.acker.ack().await
    }

    /// Negatively acknowledge. With `requeue` the message goes back on the
    /// queue for redelivery; without it the message is dropped.
    pub async fn nack(mut self, requeue: bool) -> BusResult<()> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Core event bus abstraction for topic publish/subscribe with durable
/// queues and manual acknowledgment.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a persistent message under a routing key.
    ///
    /// The caller must have already committed whatever local state change the
    /// message describes; publishing never participates in that transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishError`] when the broker did not accept the
    /// message, and [`BusError::InvalidSubject`] for malformed subjects.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Idempotently declare a durable topic exchange.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DeclareConflict`] when the exchange already exists
    /// with different parameters.
    async fn declare_exchange(&self, config: &ExchangeConfig) -> BusResult<()>;

    /// Declare the durable queue described by `binding` (idempotent), bind
    /// its patterns, and start consuming with one unacknowledged delivery
    /// outstanding at a time.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SubscribeError`] when the queue cannot be bound or
    /// already has an attached consumer.
    async fn consume(&self, binding: &QueueBinding) -> BusResult<BoxStream<'static, Delivery>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
