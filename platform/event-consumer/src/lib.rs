//! # Consumer-Side Event Dispatch
//!
//! Everything a downstream service needs to turn bus deliveries into
//! idempotent projection updates:
//!
//! - [`EventHandler`]: the projection contract, applying an envelope and
//!   reporting [`Outcome::Applied`] or [`Outcome::Skipped`]
//! - [`EventRouter`]: dispatch by exact `event_type` or prefix
//! - [`spawn_subscription`]: the per-queue runner (connect, bind, consume
//!   one delivery at a time, retry with backoff, park poison deliveries,
//!   ack/nack)
//! - [`DeadLetterSink`]: where deliveries land after the retry budget
//!
//! A duplicate or out-of-order event is **not** an error: handlers report
//! `Skipped` and the delivery is acknowledged, which is what makes
//! at-least-once delivery safe for projections.

mod dead_letter;
mod router;
mod subscription;

pub use dead_letter::{DeadLetterSink, MemoryDeadLetters, ParkedDelivery, PgDeadLetterQueue, SinkError};
pub use router::EventRouter;
pub use subscription::{spawn_subscription, SubscriptionHandle};

use async_trait::async_trait;
use event_bus::{EventEnvelope, JsonMap};

/// What applying an event did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event changed local state
    Applied,
    /// Duplicate, out-of-order, or irrelevant: deliberately a no-op
    Skipped,
}

/// Errors a projection handler can surface.
///
/// Anything returned here sends the delivery through the retry policy and,
/// if it keeps failing, into the dead-letter sink.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// A type-specific projector applying one family of events to a local store.
///
/// Implementations must be idempotent: applying the same event twice leaves
/// observable state identical to applying it once. The discipline used
/// across this workspace is a UNIQUE constraint on the identity column, with
/// the constraint violation mapped to [`Outcome::Skipped`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope<JsonMap>) -> Result<Outcome, HandlerError>;
}
