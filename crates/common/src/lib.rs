//! Shared types for the commerce core.
//!
//! Typed identifiers and value objects used across the inventory,
//! payment, event-bus, and saga crates. Wrapping raw UUIDs and strings
//! in newtypes prevents mixing up the many identifiers an order touches.

pub mod money;
pub mod types;

pub use money::{Currency, Money};
pub use types::{IdempotencyKey, OrderId, OrderLine, PaymentId, ProductId, ReservationId, Sku};
