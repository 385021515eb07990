//! Event topology seen from the user service.

use event_bus::{BusResult, EventBus, ExchangeConfig};
use std::sync::Arc;

pub mod exchanges {
    pub const USER_EVENTS: &str = "user.events";
}

pub mod subjects {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
}

/// Durable queue feeding the local projection.
pub const PROJECTION_QUEUE: &str = "users.projection";

pub async fn ensure_exchanges(bus: &Arc<dyn EventBus>) -> BusResult<()> {
    bus.declare_exchange(&ExchangeConfig::new(
        exchanges::USER_EVENTS,
        vec!["user.>".to_string()],
    ))
    .await
}
