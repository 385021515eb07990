use event_bus::{BusResult, EventBus, ExchangeConfig};
use std::sync::Arc;

pub mod exchanges {
    pub const USER_EVENTS: &str = "user.events";
    pub const AUTH_EVENTS: &str = "auth.events";
}

pub mod queues {
    pub const USER_EVENTS: &str = "audit.user-events";
    pub const AUTH_EVENTS: &str = "audit.auth-events";
}

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
