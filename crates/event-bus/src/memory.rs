use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::bus::{DeadLetter, EventBus, EventHandler, RetryPolicy};
use crate::envelope::EventEnvelope;
use crate::error::{EventBusError, Result};

/// Configuration for the in-memory event bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of each consumer group's work queue. Publishers block
    /// (asynchronously) when a queue is full.
    pub queue_capacity: usize,

    /// Retry policy applied to failing handlers.
    pub retry: RetryPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

struct Inner {
    /// topic -> consumer group -> queue sender.
    topics: HashMap<String, HashMap<String, mpsc::Sender<EventEnvelope>>>,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

/// In-memory event bus implementation.
///
/// Each consumer group gets a bounded work queue drained by a single
/// worker task, which gives FIFO delivery per group (and therefore per
/// order) without any cross-group coordination. Failing handlers are
/// retried with exponential backoff and dead-lettered once the retry
/// budget is exhausted.
#[derive(Clone)]
pub struct InMemoryEventBus {
    config: BusConfig,
    inner: Arc<RwLock<Inner>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InMemoryEventBus {
    /// Creates a new bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Creates a new bus with the given configuration.
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(Inner {
                topics: HashMap::new(),
                workers: Vec::new(),
                closed: false,
            })),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a copy of all dead-lettered envelopes.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().expect("dead letter lock").clone()
    }

    /// Returns the number of dead-lettered envelopes.
    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().expect("dead letter lock").len()
    }

    /// Shuts the bus down, draining every consumer group's queue.
    ///
    /// Publishes after shutdown fail with [`EventBusError::Closed`].
    /// Returns once all workers have processed their remaining envelopes.
    pub async fn shutdown(&self) {
        let workers = {
            let mut inner = self.inner.write().await;
            inner.closed = true;
            inner.topics.clear();
            std::mem::take(&mut inner.workers)
        };

        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("event bus shut down");
    }

    fn spawn_worker(
        &self,
        topic: String,
        consumer_group: String,
        handler: Arc<dyn EventHandler>,
        mut receiver: mpsc::Receiver<EventEnvelope>,
    ) -> JoinHandle<()> {
        let retry = self.config.retry.clone();
        let dead_letters = Arc::clone(&self.dead_letters);

        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                deliver(
                    &topic,
                    &consumer_group,
                    handler.as_ref(),
                    &retry,
                    &dead_letters,
                    envelope,
                )
                .await;
            }
            tracing::debug!(topic, consumer_group, "consumer worker stopped");
        })
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivers one envelope, retrying with backoff until the budget runs out.
async fn deliver(
    topic: &str,
    consumer_group: &str,
    handler: &dyn EventHandler,
    retry: &RetryPolicy,
    dead_letters: &Mutex<Vec<DeadLetter>>,
    envelope: EventEnvelope,
) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match handler.handle(&envelope).await {
            Ok(()) => {
                metrics::counter!("event_bus_delivered_total").increment(1);
                return;
            }
            Err(e) if attempt < retry.max_attempts => {
                metrics::counter!("event_bus_retries_total").increment(1);
                tracing::warn!(
                    topic,
                    consumer_group,
                    event_type = %envelope.event_type,
                    attempt,
                    error = %e,
                    "handler failed, retrying"
                );
                tokio::time::sleep(retry.delay_for(attempt)).await;
            }
            Err(e) => {
                metrics::counter!("event_bus_dead_letters_total").increment(1);
                tracing::error!(
                    topic,
                    consumer_group,
                    event_type = %envelope.event_type,
                    attempts = attempt,
                    error = %e,
                    "retry budget exhausted, dead-lettering envelope"
                );
                dead_letters.lock().expect("dead letter lock").push(DeadLetter {
                    topic: topic.to_string(),
                    consumer_group: consumer_group.to_string(),
                    envelope,
                    attempts: attempt,
                    error: e.to_string(),
                    failed_at: Utc::now(),
                });
                return;
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, envelope: EventEnvelope) -> Result<()> {
        let senders: Vec<mpsc::Sender<EventEnvelope>> = {
            let inner = self.inner.read().await;
            if inner.closed {
                return Err(EventBusError::Closed);
            }
            inner
                .topics
                .get(topic)
                .map(|groups| groups.values().cloned().collect())
                .unwrap_or_default()
        };

        metrics::counter!("event_bus_published_total").increment(1);
        tracing::debug!(
            topic,
            event_type = %envelope.event_type,
            order_id = %envelope.order_id,
            subscribers = senders.len(),
            "publishing event"
        );

        for sender in senders {
            // A dropped receiver means the group was shut down mid-publish;
            // remaining groups still get the envelope.
            if sender.send(envelope.clone()).await.is_err() {
                tracing::warn!(topic, "consumer group queue closed, envelope dropped");
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(EventBusError::Closed);
        }

        let groups = inner.topics.entry(topic.to_string()).or_default();
        if groups.contains_key(consumer_group) {
            return Err(EventBusError::DuplicateConsumerGroup {
                topic: topic.to_string(),
                consumer_group: consumer_group.to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
        groups.insert(consumer_group.to_string(), sender);

        let worker = self.spawn_worker(
            topic.to_string(),
            consumer_group.to_string(),
            handler,
            receiver,
        );
        inner.workers.push(worker);

        tracing::info!(topic, consumer_group, "consumer group subscribed");
        Ok(())
    }
}
