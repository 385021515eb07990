//! End-to-end consumer flow over the in-memory bus: publish -> bound queue ->
//! router -> idempotent handler -> ack/retry/dead-letter.

use async_trait::async_trait;
use event_bus::{
    EventBus, EventEnvelope, EventPublisher, ExchangeConfig, InMemoryBus, JsonMap, QueueBinding,
    RetryPolicy,
};
use event_consumer::{
    spawn_subscription, DeadLetterSink, EventHandler, EventRouter, HandlerError, MemoryDeadLetters,
    Outcome, SinkError,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Projection over a plain map, keyed by the origin-assigned id.
///
/// Mirrors the store discipline of the real services: create skips existing
/// identities, update merges only the fields present and skips unknown
/// identities, delete skips what is already gone.
#[derive(Default)]
struct UserProjection {
    records: Mutex<HashMap<String, JsonMap>>,
    calls: AtomicU32,
    failures_left: AtomicU32,
}

impl UserProjection {
    fn failing_first(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    fn record(&self, id: &str) -> Option<JsonMap> {
        self.records.lock().unwrap().get(id).cloned()
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl EventHandler for UserProjection {
    async fn handle(&self, envelope: &EventEnvelope<JsonMap>) -> Result<Outcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then(|| n - 1))
            .is_ok()
        {
            return Err(HandlerError::Other("transient store failure".into()));
        }

        let id = envelope
            .data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::Malformed("payload missing id".into()))?
            .to_string();

        let mut records = self.records.lock().unwrap();
        let outcome = match envelope.event_type.as_str() {
            "user.created" => {
                if records.contains_key(&id) {
                    Outcome::Skipped
                } else {
                    records.insert(id, envelope.data.clone());
                    Outcome::Applied
                }
            }
            "user.updated" => match records.get_mut(&id) {
                None => Outcome::Skipped,
                Some(record) => {
                    for (field, value) in &envelope.data {
                        record.insert(field.clone(), value.clone());
                    }
                    Outcome::Applied
                }
            },
            "user.deleted" => {
                if records.remove(&id).is_some() {
                    Outcome::Applied
                } else {
                    Outcome::Skipped
                }
            }
            _ => Outcome::Skipped,
        };
        Ok(outcome)
    }
}

/// Sink that refuses to park, forcing the runner down the nack+requeue path.
struct RejectingSink;

#[async_trait]
impl DeadLetterSink for RejectingSink {
    async fn park(&self, _: &event_bus::BusMessage, _: &str, _: u32) -> Result<(), SinkError> {
        Err("sink unavailable".into())
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

async fn user_bus() -> Arc<InMemoryBus> {
    let bus = Arc::new(InMemoryBus::new());
    bus.declare_exchange(&ExchangeConfig::new("user.events", vec!["user.>".into()]))
        .await
        .unwrap();
    bus
}

fn created_envelope() -> EventEnvelope<serde_json::Value> {
    EventEnvelope::new(
        "user.created",
        json!({ "id": "u1", "email": "a@b.com", "full_name": "A B" }),
    )
    .with_user("u1")
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn end_to_end_projection_and_duplicate_delivery() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::default());
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        dead_letters.clone(),
        fast_retry(),
    );

    let publisher = EventPublisher::new(bus.clone());
    let envelope = created_envelope();
    publisher.publish("user.created", &envelope).await.unwrap();

    eventually("first projection", || projection.record("u1").is_some()).await;
    let record = projection.record("u1").unwrap();
    assert_eq!(record.get("email"), Some(&json!("a@b.com")));
    assert_eq!(record.get("full_name"), Some(&json!("A B")));

    // Republishing the identical envelope must not create a second record,
    // and the duplicate must still be acknowledged (queue keeps draining).
    publisher.publish("user.created", &envelope).await.unwrap();
    eventually("duplicate processed", || {
        projection.calls.load(Ordering::SeqCst) >= 2
    })
    .await;
    assert_eq!(projection.len(), 1);
    assert!(dead_letters.parked().is_empty());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn handler_failure_retries_then_applies_exactly_once() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::failing_first(1));
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        dead_letters.clone(),
        fast_retry(),
    );

    EventPublisher::new(bus.clone())
        .publish("user.created", &created_envelope())
        .await
        .unwrap();

    eventually("retry applies", || projection.record("u1").is_some()).await;
    assert_eq!(projection.len(), 1);
    assert_eq!(projection.calls.load(Ordering::SeqCst), 2);
    assert!(dead_letters.parked().is_empty());
}

#[tokio::test]
async fn failed_delivery_is_requeued_when_parking_fails() {
    let bus = user_bus().await;
    // Budget of one attempt per delivery: the first delivery fails outright,
    // parking is rejected, the message is nacked back onto the queue, and
    // only the redelivery succeeds.
    let projection = Arc::new(UserProjection::failing_first(1));

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        Arc::new(RejectingSink),
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        },
    );

    EventPublisher::new(bus.clone())
        .publish("user.created", &created_envelope())
        .await
        .unwrap();

    eventually("redelivery applies", || projection.record("u1").is_some()).await;
    assert_eq!(projection.len(), 1);
    assert_eq!(projection.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn poison_delivery_is_parked_and_queue_keeps_draining() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::failing_first(u32::MAX));
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        dead_letters.clone(),
        fast_retry(),
    );

    let publisher = EventPublisher::new(bus.clone());
    publisher
        .publish("user.created", &created_envelope())
        .await
        .unwrap();

    eventually("poison parked", || !dead_letters.parked().is_empty()).await;
    let parked = dead_letters.parked();
    assert_eq!(parked[0].attempts, 3);
    assert_eq!(parked[0].subject, "user.created");
    assert_eq!(projection.len(), 0);

    // a healthy event behind the poison one still gets through
    projection.failures_left.store(0, Ordering::SeqCst);
    publisher
        .publish(
            "user.created",
            &EventEnvelope::new("user.created", json!({ "id": "u2", "email": "c@d.com" })),
        )
        .await
        .unwrap();
    eventually("queue drains past poison", || {
        projection.record("u2").is_some()
    })
    .await;
}

#[tokio::test]
async fn malformed_payload_is_parked_not_looped() {
    let bus = user_bus().await;
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", Arc::new(UserProjection::default())),
        dead_letters.clone(),
        fast_retry(),
    );

    bus.publish("user.created", b"not json at all".to_vec())
        .await
        .unwrap();

    eventually("malformed parked", || !dead_letters.parked().is_empty()).await;
    assert_eq!(dead_letters.parked()[0].payload, b"not json at all");
}

#[tokio::test]
async fn update_before_create_is_skipped_without_partial_record() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::default());
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        dead_letters.clone(),
        fast_retry(),
    );

    EventPublisher::new(bus.clone())
        .publish(
            "user.updated",
            &EventEnvelope::new("user.updated", json!({ "id": "u9", "full_name": "New" })),
        )
        .await
        .unwrap();

    eventually("update dispatched", || {
        projection.calls.load(Ordering::SeqCst) >= 1
    })
    .await;
    assert_eq!(projection.len(), 0, "no partial record may be created");
    assert!(dead_letters.parked().is_empty(), "out-of-order is not an error");
}

#[tokio::test]
async fn partial_update_leaves_other_fields_unchanged() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::default());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        EventRouter::new().on_prefix("user.", projection.clone()),
        Arc::new(MemoryDeadLetters::new()),
        fast_retry(),
    );

    let publisher = EventPublisher::new(bus.clone());
    publisher
        .publish("user.created", &created_envelope())
        .await
        .unwrap();
    eventually("created", || projection.record("u1").is_some()).await;

    publisher
        .publish(
            "user.updated",
            &EventEnvelope::new("user.updated", json!({ "id": "u1", "full_name": "Renamed" })),
        )
        .await
        .unwrap();

    eventually("renamed", || {
        projection
            .record("u1")
            .and_then(|r| r.get("full_name").cloned())
            == Some(json!("Renamed"))
    })
    .await;

    let record = projection.record("u1").unwrap();
    assert_eq!(record.get("email"), Some(&json!("a@b.com")));
}

#[tokio::test]
async fn unknown_event_type_is_ignored_and_acked() {
    let bus = user_bus().await;
    let projection = Arc::new(UserProjection::default());
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let _handle = spawn_subscription(
        bus.clone(),
        QueueBinding::new("user.queue", "user.events", vec!["user.*".into()]),
        // only creations are routed; user.promoted has no handler
        EventRouter::new().on("user.created", projection.clone()),
        dead_letters.clone(),
        fast_retry(),
    );

    let publisher = EventPublisher::new(bus.clone());
    publisher
        .publish(
            "user.promoted",
            &EventEnvelope::new("user.promoted", json!({ "id": "u1" })),
        )
        .await
        .unwrap();
    publisher
        .publish("user.created", &created_envelope())
        .await
        .unwrap();

    // the unknown event was acked, otherwise the creation never arrives
    eventually("creation after unknown", || projection.record("u1").is_some()).await;
    assert!(dead_letters.parked().is_empty());
}

#[tokio::test]
async fn routing_key_reaches_matching_queues_only() {
    let bus = user_bus().await;
    bus.declare_exchange(&ExchangeConfig::new("auth.events", vec!["auth.>".into()]))
        .await
        .unwrap();

    let wildcard = Arc::new(UserProjection::default());
    let exact = Arc::new(UserProjection::default());
    let auth_only = Arc::new(UserProjection::default());
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let mut handles = Vec::new();
    for (queue, exchange, pattern, projection) in [
        ("wildcard.queue", "user.events", "user.*", wildcard.clone()),
        ("exact.queue", "user.events", "user.created", exact.clone()),
        ("auth.queue", "auth.events", "auth.*", auth_only.clone()),
    ] {
        handles.push(spawn_subscription(
            bus.clone(),
            QueueBinding::new(queue, exchange, vec![pattern.into()]),
            EventRouter::new().on_any(projection),
            dead_letters.clone(),
            fast_retry(),
        ));
    }

    EventPublisher::new(bus.clone())
        .publish("user.created", &created_envelope())
        .await
        .unwrap();

    eventually("wildcard binding", || wildcard.record("u1").is_some()).await;
    eventually("exact binding", || exact.record("u1").is_some()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(auth_only.calls.load(Ordering::SeqCst), 0);
}
