//! Event bus error types.

use thiserror::Error;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus has been shut down and no longer accepts work.
    #[error("Event bus is shut down")]
    Closed,

    /// A consumer group is already subscribed to the topic.
    #[error("Consumer group '{consumer_group}' already subscribed to topic '{topic}'")]
    DuplicateConsumerGroup {
        topic: String,
        consumer_group: String,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;

/// Error returned by an event handler.
///
/// Any handler error triggers the bus retry path; after the retry budget
/// is exhausted the envelope is dead-lettered with this message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a new handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}
