//! Dispatch table mapping event types to projection handlers.

use crate::EventHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes a decoded envelope to the handler registered for its
/// `event_type`, by exact match first and longest registered prefix second.
///
/// ```rust,no_run
/// # use event_consumer::{EventRouter, EventHandler};
/// # use std::sync::Arc;
/// # fn build(users: Arc<dyn EventHandler>, audit: Arc<dyn EventHandler>) -> EventRouter {
/// EventRouter::new()
///     .on("user.created", users)
///     .on_prefix("auth.", audit)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct EventRouter {
    exact: HashMap<String, Arc<dyn EventHandler>>,
    prefix: Vec<(String, Arc<dyn EventHandler>)>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact event type.
    pub fn on(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.exact.insert(event_type.into(), handler);
        self
    }

    /// Register a handler for every event type starting with `prefix`.
    pub fn on_prefix(mut self, prefix: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.prefix.push((prefix.into(), handler));
        self
    }

    /// Register a catch-all handler consulted when nothing else matches.
    pub fn on_any(self, handler: Arc<dyn EventHandler>) -> Self {
        self.on_prefix("", handler)
    }

    pub fn route(&self, event_type: &str) -> Option<&dyn EventHandler> {
        if let Some(handler) = self.exact.get(event_type) {
            return Some(handler.as_ref());
        }
        self.prefix
            .iter()
            .filter(|(prefix, _)| event_type.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| handler.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerError, Outcome};
    use async_trait::async_trait;
    use event_bus::{EventEnvelope, JsonMap};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _: &EventEnvelope<JsonMap>) -> Result<Outcome, HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Applied)
        }
    }

    fn handler() -> Arc<Counting> {
        Arc::new(Counting(AtomicU32::new(0)))
    }

    #[tokio::test]
    async fn exact_match_wins_over_prefix() {
        let exact = handler();
        let by_prefix = handler();
        let router = EventRouter::new()
            .on("user.created", exact.clone())
            .on_prefix("user.", by_prefix.clone());

        let envelope = EventEnvelope::new("user.created", JsonMap::new());
        router
            .route("user.created")
            .unwrap()
            .handle(&envelope)
            .await
            .unwrap();

        assert_eq!(exact.0.load(Ordering::SeqCst), 1);
        assert_eq!(by_prefix.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let broad = handler();
        let narrow = handler();
        let router = EventRouter::new()
            .on_prefix("user.", broad.clone())
            .on_prefix("user.profile.", narrow.clone());

        let envelope = EventEnvelope::new("user.profile.updated", JsonMap::new());
        router
            .route("user.profile.updated")
            .unwrap()
            .handle(&envelope)
            .await
            .unwrap();

        assert_eq!(narrow.0.load(Ordering::SeqCst), 1);
        assert_eq!(broad.0.load(Ordering::SeqCst), 0);

        let envelope = EventEnvelope::new("user.deleted", JsonMap::new());
        router
            .route("user.deleted")
            .unwrap()
            .handle(&envelope)
            .await
            .unwrap();
        assert_eq!(broad.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_type_routes_nowhere() {
        let router = EventRouter::new().on("user.created", handler());
        assert!(router.route("billing.invoiced").is_none());
    }

    #[test]
    fn catch_all_sees_everything() {
        let router = EventRouter::new().on_any(handler());
        assert!(router.route("user.created").is_some());
        assert!(router.route("auth.login").is_some());
    }
}
