//! One durable queue per subscribed exchange, each on its own task.

use crate::events::{exchanges, queues};
use crate::handler::AuditEventHandler;
use event_bus::{EventBus, QueueBinding, RetryPolicy};
use event_consumer::{spawn_subscription, EventRouter, PgDeadLetterQueue, SubscriptionHandle};
use sqlx::PgPool;
use std::sync::Arc;

pub fn start_consumers(bus: Arc<dyn EventBus>, db: PgPool) -> Vec<SubscriptionHandle> {
    let bindings = [
        QueueBinding::new(queues::USER_EVENTS, exchanges::USER_EVENTS, vec!["user.*".to_string()]),
        QueueBinding::new(queues::AUTH_EVENTS, exchanges::AUTH_EVENTS, vec!["auth.*".to_string()]),
    ];

    bindings
        .into_iter()
        .map(|binding| {
            let handler = Arc::new(AuditEventHandler::new(db.clone()));
            spawn_subscription(
                bus.clone(),
                binding.clone(),
                EventRouter::new().on_any(handler),
                Arc::new(PgDeadLetterQueue::new(db.clone(), binding.queue.as_str())),
                RetryPolicy::default(),
            )
        })
        .collect()
}
