//! Order fulfillment saga for the commerce core.
//!
//! The orchestrator drives the order state machine by consuming and
//! producing events: an order-creation event triggers stock reservation;
//! full reservation triggers a payment request; the payment outcome
//! drives either a commit (consume the reservations, confirm the order)
//! or a compensation (release the reservations, cancel the order). All
//! inter-service interaction goes through the event bus with
//! at-least-once delivery, so every handler here is idempotent.

pub mod error;
pub mod events;
pub mod order;
pub mod orchestrator;
pub mod payment_worker;
pub mod status;
pub mod store;
pub mod topics;

pub use error::{Result, SagaError};
pub use events::OrderEvent;
pub use order::{Order, PricingPolicy};
pub use orchestrator::OrderSagaOrchestrator;
pub use payment_worker::PaymentProcessor;
pub use status::{OrderStatus, PaymentState};
pub use store::{InMemoryOrderStore, OrderStore, StatusChange};
