//! Event topology and payloads owned by the auth service.
//!
//! Registration is the source-of-truth write for a user's existence, so the
//! `user.created` payload carries the full user document: downstream
//! projections must never need a callback to this service.

use chrono::{DateTime, Utc};
use event_bus::{BusResult, EventBus, ExchangeConfig};
use serde::Serialize;
use std::sync::Arc;

pub mod exchanges {
    pub const USER_EVENTS: &str = "user.events";
    pub const AUTH_EVENTS: &str = "auth.events";
}

pub mod subjects {
    pub const USER_CREATED: &str = "user.created";
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_LOGOUT: &str = "auth.logout";
    pub const AUTH_TOKEN_REFRESHED: &str = "auth.token_refreshed";
}

/// Declare the durable exchanges this service publishes to (idempotent).
pub async fn ensure_exchanges(bus: &Arc<dyn EventBus>) -> BusResult<()> {
    bus.declare_exchange(&ExchangeConfig::new(
        exchanges::USER_EVENTS,
        vec!["user.>".to_string()],
    ))
    .await?;
    bus.declare_exchange(&ExchangeConfig::new(
        exchanges::AUTH_EVENTS,
        vec!["auth.>".to_string()],
    ))
    .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct UserCreatedData {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenRefreshedData {}

#[derive(Debug, Serialize)]
pub struct LogoutData {}
