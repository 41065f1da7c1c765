//! Event bus traits and delivery policies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::envelope::EventEnvelope;
use crate::error::{HandlerError, Result};

/// Trait for event consumers.
///
/// Handlers are invoked at-least-once and must therefore be idempotent:
/// redelivery of an already-handled envelope must be a harmless no-op.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one delivered envelope.
    ///
    /// Returning an error triggers bounded retry with backoff; exhausting
    /// the budget moves the envelope to the dead-letter channel.
    async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), HandlerError>;
}

/// Core trait for event bus implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope to a topic.
    ///
    /// Every consumer group subscribed to the topic receives the envelope.
    /// Envelopes for the same order are delivered to a given group in
    /// publish order.
    async fn publish(&self, topic: &str, envelope: EventEnvelope) -> Result<()>;

    /// Subscribes a handler to a topic under a consumer group.
    ///
    /// One group receives each envelope once (modulo retries); distinct
    /// groups each receive their own copy.
    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;
}

/// Retry policy for failed handler invocations.
///
/// Delays grow exponentially from `base_delay`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total delivery attempts before dead-lettering (including the first).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any single retry delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// An envelope that exhausted its retry budget, parked for manual handling.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The topic the envelope was published to.
    pub topic: String,

    /// The consumer group whose handler kept failing.
    pub consumer_group: String,

    /// The undeliverable envelope.
    pub envelope: EventEnvelope,

    /// How many delivery attempts were made.
    pub attempts: u32,

    /// The final handler error.
    pub error: String,

    /// When the envelope was dead-lettered.
    pub failed_at: DateTime<Utc>,
}
