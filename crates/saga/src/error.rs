//! Saga error types.

use common::OrderId;
use event_bus::EventBusError;
use inventory::InventoryError;
use payment::PaymentError;
use thiserror::Error;

use crate::status::{OrderStatus, PaymentState};

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No order exists with the given ID.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order cannot move to the requested status.
    #[error("Invalid order transition for {order_id}: {status}/{payment_state} -> {action}")]
    InvalidTransition {
        order_id: OrderId,
        status: OrderStatus,
        payment_state: PaymentState,
        action: &'static str,
    },

    /// An order must have at least one line item.
    #[error("Order {0} has no line items")]
    EmptyOrder(OrderId),

    /// Inventory ledger error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Payment ledger error.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] EventBusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
