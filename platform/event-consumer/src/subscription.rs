//! Per-queue subscription runner.
//!
//! Each subscribed queue gets its own tokio task, isolated from the
//! service's HTTP runtime. The task walks the consumer lifecycle
//! (`STOPPED -> CONNECTING -> BOUND -> CONSUMING -> STOPPED`), processes
//! exactly one delivery at a time, and resolves every delivery explicitly:
//!
//! - handler success (`Applied`/`Skipped`) -> ack
//! - handler failure -> retry with backoff; budget spent -> park in the
//!   dead-letter sink, then ack
//! - parking failed -> nack with requeue, the broker redelivers later
//!
//! A decode failure is treated exactly like a handler failure.

use crate::{DeadLetterSink, EventRouter, HandlerError, Outcome};
use event_bus::{BusMessage, Delivery, EventBus, EventEnvelope, QueueBinding, RetryPolicy};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Bound,
    Consuming,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Connecting => "connecting",
            State::Bound => "bound",
            State::Consuming => "consuming",
            State::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Handle to a running subscription task.
pub struct SubscriptionHandle {
    queue: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Signal the task to stop consuming new deliveries. The in-flight
    /// delivery (if any) finishes; an abandoned one stays unacknowledged and
    /// is redelivered on the next start.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Spawn the consumer task for one durable queue binding.
pub fn spawn_subscription(
    bus: Arc<dyn EventBus>,
    binding: QueueBinding,
    router: EventRouter,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryPolicy,
) -> SubscriptionHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let queue = binding.queue.clone();

    let task = tokio::spawn(run(bus, binding, router, dead_letters, retry, shutdown_rx));

    SubscriptionHandle {
        queue,
        shutdown: shutdown_tx,
        task,
    }
}

async fn run(
    bus: Arc<dyn EventBus>,
    binding: QueueBinding,
    router: EventRouter,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let queue = binding.queue.clone();

    'lifecycle: loop {
        transition(&queue, State::Connecting);

        let mut deliveries = loop {
            match bus.consume(&binding).await {
                Ok(stream) => break stream,
                Err(e) => {
                    tracing::warn!(
                        queue = %queue,
                        error = %e,
                        backoff_ms = retry.initial_backoff.as_millis() as u64,
                        "failed to bind queue, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(retry.initial_backoff) => {}
                        _ = shutdown.changed() => break 'lifecycle,
                    }
                }
            }
        };
        transition(&queue, State::Bound);
        transition(&queue, State::Consuming);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break 'lifecycle,
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        process_delivery(&queue, delivery, &router, dead_letters.as_ref(), &retry)
                            .await;
                    }
                    None => {
                        tracing::warn!(queue = %queue, "delivery stream ended, reconnecting");
                        continue 'lifecycle;
                    }
                },
            }
        }
    }

    transition(&queue, State::Stopped);
}

fn transition(queue: &str, state: State) {
    tracing::debug!(queue = %queue, state = %state, "consumer state change");
}

async fn process_delivery(
    queue: &str,
    delivery: Delivery,
    router: &EventRouter,
    dead_letters: &dyn DeadLetterSink,
    retry: &RetryPolicy,
) {
    let message = delivery.message.clone();
    let context = format!("{queue}:{}", message.subject);

    let result = retry
        .run(&context, || dispatch(router, &message))
        .await;

    match result {
        Ok(outcome) => {
            tracing::debug!(
                queue = %queue,
                subject = %message.subject,
                outcome = ?outcome,
                "event processed"
            );
            if let Err(e) = delivery.ack().await {
                tracing::error!(queue = %queue, subject = %message.subject, error = %e, "ack failed");
            }
        }
        Err(e) => {
            let error = e.to_string();
            tracing::error!(
                queue = %queue,
                subject = %message.subject,
                error = %error,
                "delivery failed after retries, parking"
            );
            match dead_letters.park(&message, &error, retry.max_attempts).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        tracing::error!(queue = %queue, error = %e, "ack after parking failed");
                    }
                }
                Err(park_err) => {
                    tracing::error!(
                        queue = %queue,
                        subject = %message.subject,
                        error = %park_err,
                        "dead letter parking failed, requeueing delivery"
                    );
                    if let Err(e) = delivery.nack(true).await {
                        tracing::error!(queue = %queue, error = %e, "nack failed");
                    }
                }
            }
        }
    }
}

async fn dispatch(router: &EventRouter, message: &BusMessage) -> Result<Outcome, HandlerError> {
    let envelope = EventEnvelope::from_slice(&message.payload)
        .map_err(|e| HandlerError::Malformed(e.to_string()))?;

    match router.route(&envelope.event_type) {
        Some(handler) => handler.handle(&envelope).await,
        None => {
            // Forward compatibility: origin services may add event kinds
            // this consumer does not know yet.
            tracing::warn!(
                event_type = %envelope.event_type,
                subject = %message.subject,
                "no handler registered, ignoring event"
            );
            Ok(Outcome::Skipped)
        }
    }
}
