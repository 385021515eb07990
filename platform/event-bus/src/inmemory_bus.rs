//! In-memory implementation of the EventBus trait for dev and test.

use crate::{
    pattern, Acknowledge, BusError, BusMessage, BusResult, Delivery, EventBus, ExchangeConfig,
    QueueBinding,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// EventBus implementation backed by in-process queues.
///
/// Suitable for unit tests, local development without a broker, and
/// integration tests that need fast, isolated buses. It keeps the same
/// contract as the JetStream backend: published messages fan out to every
/// declared queue whose exchange captures the subject and whose binding
/// patterns match it; each queue hands out one unacknowledged delivery at a
/// time, and a nack with requeue puts the message back for redelivery.
///
/// Queues live only as long as the process; an unacked delivery from a
/// crashed consumer is not recovered (the broker backend covers that).
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<String, ExchangeConfig>,
    queues: HashMap<String, QueueState>,
}

struct QueueState {
    binding: QueueBinding,
    tx: UnboundedSender<QueuedMessage>,
    // taken by the first (only) consumer of this queue
    rx: Option<UnboundedReceiver<QueuedMessage>>,
}

struct QueuedMessage {
    message: BusMessage,
    redelivered: bool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        pattern::validate_subject(subject)?;

        let inner = self.inner.lock().expect("bus lock poisoned");

        let captured = inner
            .exchanges
            .values()
            .any(|ex| ex.subjects.iter().any(|s| pattern::matches(subject, s)));
        if !captured {
            return Err(BusError::PublishError(format!(
                "no exchange captures subject {subject}"
            )));
        }

        for queue in inner.queues.values() {
            let exchange_captures = inner
                .exchanges
                .get(&queue.binding.exchange)
                .map(|ex| ex.subjects.iter().any(|s| pattern::matches(subject, s)))
                .unwrap_or(false);
            let bound = queue
                .binding
                .patterns
                .iter()
                .any(|p| pattern::matches(subject, p));

            if exchange_captures && bound {
                // receiver may be gone; undelivered messages just age out
                let _ = queue.tx.send(QueuedMessage {
                    message: BusMessage::new(subject, payload.clone()),
                    redelivered: false,
                });
            }
        }

        Ok(())
    }

    async fn declare_exchange(&self, config: &ExchangeConfig) -> BusResult<()> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");

        match inner.exchanges.get(&config.name) {
            Some(existing) if existing == config => Ok(()),
            Some(_) => Err(BusError::DeclareConflict(format!(
                "exchange {} already declared with different parameters",
                config.name
            ))),
            None => {
                inner.exchanges.insert(config.name.clone(), config.clone());
                Ok(())
            }
        }
    }

    async fn consume(&self, binding: &QueueBinding) -> BusResult<BoxStream<'static, Delivery>> {
        for p in &binding.patterns {
            pattern::normalize(p)?;
        }

        let (tx, mut rx) = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");

            if !inner.exchanges.contains_key(&binding.exchange) {
                return Err(BusError::SubscribeError(format!(
                    "unknown exchange {}",
                    binding.exchange
                )));
            }

            let queue = inner
                .queues
                .entry(binding.queue.clone())
                .or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    QueueState {
                        binding: binding.clone(),
                        tx,
                        rx: Some(rx),
                    }
                });

            if &queue.binding != binding {
                return Err(BusError::DeclareConflict(format!(
                    "queue {} already declared with different parameters",
                    binding.queue
                )));
            }

            let rx = queue.rx.take().ok_or_else(|| {
                BusError::SubscribeError(format!(
                    "queue {} already has a consumer attached",
                    binding.queue
                ))
            })?;

            (queue.tx.clone(), rx)
        };

        // One outstanding unacknowledged delivery per queue: the next
        // message is only handed out once the previous permit is released
        // by ack/nack (or the delivery is dropped).
        let in_flight = Arc::new(Semaphore::new(1));

        let stream = async_stream::stream! {
            loop {
                let permit = match in_flight.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                match rx.recv().await {
                    Some(queued) => {
                        let acker = InMemoryAcker {
                            requeue_tx: tx.clone(),
                            message: queued.message.clone(),
                            permit: Some(permit),
                        };
                        yield Delivery::new(queued.message, queued.redelivered, Box::new(acker));
                    }
                    None => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}

struct InMemoryAcker {
    requeue_tx: UnboundedSender<QueuedMessage>,
    message: BusMessage,
    permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Acknowledge for InMemoryAcker {
    async fn ack(&mut self) -> BusResult<()> {
        self.permit.take();
        Ok(())
    }

    async fn nack(&mut self, requeue: bool) -> BusResult<()> {
        if requeue {
            let _ = self.requeue_tx.send(QueuedMessage {
                message: self.message.clone(),
                redelivered: true,
            });
        }
        self.permit.take();
        Ok(())
    }
}
