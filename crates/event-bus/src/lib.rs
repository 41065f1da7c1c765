//! Event bus adapter for the commerce core.
//!
//! A narrow publish/subscribe contract mediating all inter-service
//! interaction. Delivery is at-least-once: handlers must be idempotent.
//! Events published for the same order are delivered to a given consumer
//! group in publish order; no cross-order ordering guarantee exists.
//!
//! Handler failures are retried with exponential backoff. Once the retry
//! budget is exhausted the envelope is moved to a dead-letter channel for
//! manual inspection instead of blocking the queue.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;

pub use bus::{DeadLetter, EventBus, EventHandler, RetryPolicy};
pub use envelope::{EventEnvelope, EventEnvelopeBuilder, EventId};
pub use error::{EventBusError, HandlerError, Result};
pub use memory::{BusConfig, InMemoryEventBus};
