//! Event envelope: the wire format for every cross-service notification.
//!
//! An envelope is constructed immediately after the owning service's local
//! transactional write commits, so it always describes a fact that already
//! exists. It is immutable once built and is never persisted by the
//! publisher itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BusError, BusResult};

/// Flat ordered payload mapping: field name to string/number/bool/null/map.
///
/// Consumers decode `data` as this type so any publisher-side struct stays
/// readable without a shared schema.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Standard envelope wrapping every event published across service
/// boundaries.
///
/// `event_type` doubles as the routing key and as the consumer dispatch
/// discriminator; `data` carries enough domain fields for a downstream
/// service to build its projection row without calling back to the origin.
///
/// # Examples
///
/// ```rust
/// use event_bus::EventEnvelope;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct UserCreated {
///     id: String,
///     email: String,
/// }
///
/// let envelope = EventEnvelope::new(
///     "user.created",
///     UserCreated {
///         id: "u1".into(),
///         email: "a@b.com".into(),
///     },
/// )
/// .with_user("u1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T = JsonMap> {
    /// Unique event identifier
    pub event_id: Uuid,

    /// Dot-namespaced type, `<domain>.<action>` (e.g. `user.created`)
    pub event_type: String,

    /// Acting/affected user; `null` for system-level events
    pub user_id: Option<String>,

    /// Publisher-side emission time
    pub timestamp: DateTime<Utc>,

    /// Event-specific payload
    pub data: T,
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope with a fresh `event_id` and the current time.
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            user_id: None,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Create an envelope with an explicit `event_id` (useful for tests).
    pub fn with_event_id(event_id: Uuid, event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            user_id: None,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Set the acting/affected user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl EventEnvelope<JsonMap> {
    /// Decode an envelope from raw message bytes and check its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SerializationError`] for malformed JSON or an
    /// envelope violating [`validate_envelope`].
    pub fn from_slice(payload: &[u8]) -> BusResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| BusError::SerializationError(e.to_string()))?;
        validate_envelope(&value).map_err(BusError::SerializationError)?;
        serde_json::from_value(value).map_err(|e| BusError::SerializationError(e.to_string()))
    }
}

/// Validate the structural invariants of a decoded envelope.
///
/// # Validation Rules
///
/// - `event_type`: present, non-empty string
/// - `timestamp`: present string
/// - `data`: an object when present
///
/// # Errors
///
/// Returns a descriptive message naming the first violated rule.
pub fn validate_envelope(envelope: &serde_json::Value) -> Result<(), String> {
    let event_type = envelope
        .get("event_type")
        .and_then(|v| v.as_str())
        .ok_or("missing or invalid event_type")?;

    if event_type.is_empty() {
        return Err("event_type cannot be empty".to_string());
    }

    envelope
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or("missing or invalid timestamp")?;

    if let Some(data) = envelope.get("data") {
        if !data.is_object() {
            return Err("data must be an object".to_string());
        }
    }

    Ok(())
}
