//! Translates received envelopes into audit log rows.

use async_trait::async_trait;
use event_bus::{EventEnvelope, JsonMap};
use event_consumer::{EventHandler, HandlerError, Outcome};
use sqlx::PgPool;

/// Catch-all projector: every event on the bound queues becomes one row.
///
/// `resource_type` is the event's domain (`user.created` -> `user`), the
/// action its last segment, and the open payload lands in the JSONB
/// `metadata` column untouched.
pub struct AuditEventHandler {
    db: PgPool,
}

impl AuditEventHandler {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn classify(event_type: &str) -> (&str, &str) {
    let resource_type = match event_type.split('.').next() {
        Some("user") => "user",
        Some("auth") => "auth",
        _ => "system",
    };
    let action = event_type.rsplit('.').next().unwrap_or(event_type);
    (resource_type, action)
}

#[async_trait]
impl EventHandler for AuditEventHandler {
    async fn handle(&self, envelope: &EventEnvelope<JsonMap>) -> Result<Outcome, HandlerError> {
        let (resource_type, action) = classify(&envelope.event_type);

        // for user events the affected resource is the user itself
        let resource_id = envelope
            .data
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| (resource_type == "user").then(|| envelope.user_id.clone()).flatten());

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (event_id, event_type, user_id, resource_type, resource_id, action, metadata, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(envelope.event_id)
        .bind(&envelope.event_type)
        .bind(&envelope.user_id)
        .bind(resource_type)
        .bind(&resource_id)
        .bind(action)
        .bind(serde_json::Value::Object(envelope.data.clone()))
        .bind(envelope.timestamp)
        .execute(&self.db)
        .await
        .map_err(HandlerError::Database)?;

        if result.rows_affected() == 0 {
            tracing::debug!(event_id = %envelope.event_id, "event already recorded, skipping");
            Ok(Outcome::Skipped)
        } else {
            tracing::info!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                resource_type,
                action,
                "audit log recorded"
            );
            Ok(Outcome::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_classify_into_resource_and_action() {
        assert_eq!(classify("user.created"), ("user", "created"));
        assert_eq!(classify("auth.token_refreshed"), ("auth", "token_refreshed"));
        assert_eq!(classify("billing.invoice.paid"), ("system", "paid"));
    }
}
