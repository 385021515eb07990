//! Dead-letter sink: where deliveries land once the retry budget is spent.
//!
//! Parking a delivery and acknowledging it keeps the queue draining while
//! guaranteeing the event is not silently dropped; an operator can inspect
//! `dead_letter_events` and replay from there.

use async_trait::async_trait;
use event_bus::BusMessage;
use sqlx::PgPool;
use std::sync::Mutex;
use uuid::Uuid;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Record a delivery that could not be processed.
    ///
    /// # Errors
    ///
    /// An error here makes the caller nack the delivery with requeue instead
    /// of acking it, so the event is retried later rather than lost.
    async fn park(&self, message: &BusMessage, error: &str, attempts: u32)
        -> Result<(), SinkError>;
}

/// Postgres-backed sink writing to the service's `dead_letter_events` table.
pub struct PgDeadLetterQueue {
    pool: PgPool,
    consumer: String,
}

impl PgDeadLetterQueue {
    pub fn new(pool: PgPool, consumer: impl Into<String>) -> Self {
        Self {
            pool,
            consumer: consumer.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for PgDeadLetterQueue {
    async fn park(
        &self,
        message: &BusMessage,
        error: &str,
        attempts: u32,
    ) -> Result<(), SinkError> {
        // A payload that never decoded still gets parked, wrapped as raw text.
        let envelope: serde_json::Value = serde_json::from_slice(&message.payload)
            .unwrap_or_else(|_| {
                serde_json::json!({ "raw": String::from_utf8_lossy(&message.payload) })
            });

        let event_id = envelope
            .get("event_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        sqlx::query(
            r#"
            INSERT INTO dead_letter_events (event_id, subject, envelope, error, attempts, consumer)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO UPDATE
            SET attempts = EXCLUDED.attempts,
                error = EXCLUDED.error,
                failed_at = NOW()
            "#,
        )
        .bind(event_id)
        .bind(&message.subject)
        .bind(&envelope)
        .bind(error)
        .bind(attempts as i32)
        .bind(&self.consumer)
        .execute(&self.pool)
        .await?;

        tracing::error!(
            subject = %message.subject,
            consumer = %self.consumer,
            attempts,
            error = %error,
            "delivery parked in dead letter queue"
        );

        Ok(())
    }
}

/// A parked delivery held by [`MemoryDeadLetters`].
#[derive(Debug, Clone)]
pub struct ParkedDelivery {
    pub subject: String,
    pub payload: Vec<u8>,
    pub error: String,
    pub attempts: u32,
}

/// In-memory sink for tests and brokerless development.
#[derive(Default)]
pub struct MemoryDeadLetters {
    parked: Mutex<Vec<ParkedDelivery>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parked(&self) -> Vec<ParkedDelivery> {
        self.parked.lock().expect("dead letter lock poisoned").clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn park(
        &self,
        message: &BusMessage,
        error: &str,
        attempts: u32,
    ) -> Result<(), SinkError> {
        self.parked
            .lock()
            .expect("dead letter lock poisoned")
            .push(ParkedDelivery {
                subject: message.subject.clone(),
                payload: message.payload.clone(),
                error: error.to_string(),
                attempts,
            });
        Ok(())
    }
}
