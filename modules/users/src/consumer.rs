//! Projection consumer wiring.

use crate::events::{self, subjects};
use crate::projection::{
    apply_user_created, apply_user_deleted, apply_user_updated, UserCreatedData, UserDeletedData,
    UserUpdatedData,
};
use async_trait::async_trait;
use event_bus::{EventBus, EventEnvelope, JsonMap, QueueBinding, RetryPolicy};
use event_consumer::{
    spawn_subscription, EventHandler, EventRouter, HandlerError, Outcome, PgDeadLetterQueue,
    SubscriptionHandle,
};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use std::sync::Arc;

pub struct UserProjectionHandler {
    db: PgPool,
}

impl UserProjectionHandler {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn decode<T: DeserializeOwned>(data: &JsonMap) -> Result<T, HandlerError> {
    serde_json::from_value(serde_json::Value::Object(data.clone()))
        .map_err(|e| HandlerError::Malformed(e.to_string()))
}

/// A unique violation on insert means another delivery of the same identity
/// won the race; that is the skip case, not a failure.
fn skip_on_unique_violation(e: sqlx::Error) -> Result<Outcome, HandlerError> {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            tracing::warn!(error = %db_err, "unique violation while projecting, treating as duplicate");
            return Ok(Outcome::Skipped);
        }
    }
    Err(HandlerError::Database(e))
}

#[async_trait]
impl EventHandler for UserProjectionHandler {
    async fn handle(&self, envelope: &EventEnvelope<JsonMap>) -> Result<Outcome, HandlerError> {
        match envelope.event_type.as_str() {
            subjects::USER_CREATED => {
                let data: UserCreatedData = decode(&envelope.data)?;
                match apply_user_created(&self.db, &data).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => skip_on_unique_violation(e),
                }
            }
            subjects::USER_UPDATED => {
                let data: UserUpdatedData = decode(&envelope.data)?;
                match apply_user_updated(&self.db, &data).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => skip_on_unique_violation(e),
                }
            }
            subjects::USER_DELETED => {
                let data: UserDeletedData = decode(&envelope.data)?;
                Ok(apply_user_deleted(&self.db, &data).await?)
            }
            other => {
                tracing::warn!(event_type = %other, "unexpected event type in user projection");
                Ok(Outcome::Skipped)
            }
        }
    }
}

/// Bind the projection queue and start consuming `user.*` events.
pub fn start_projection_consumer(bus: Arc<dyn EventBus>, db: PgPool) -> SubscriptionHandle {
    let handler = Arc::new(UserProjectionHandler::new(db.clone()));
    let router = EventRouter::new()
        .on(subjects::USER_CREATED, handler.clone())
        .on(subjects::USER_UPDATED, handler.clone())
        .on(subjects::USER_DELETED, handler);

    spawn_subscription(
        bus,
        QueueBinding::new(
            events::PROJECTION_QUEUE,
            events::exchanges::USER_EVENTS,
            vec!["user.*".to_string()],
        ),
        router,
        Arc::new(PgDeadLetterQueue::new(db, "users-projection")),
        RetryPolicy::default(),
    )
}
