//! Order status axes.

use serde::{Deserialize, Serialize};

/// The workflow state of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Confirmed ──► Cancelled   (refund path)
///           └──► Cancelled
/// ```
///
/// Confirmed orders progress to shipment via separate fulfillment events
/// outside this core; Cancelled is saga-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Submitted; reservation and payment still in flight.
    #[default]
    Pending,

    /// Stock committed and payment captured.
    Confirmed,

    /// Compensated and closed (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed from this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled from this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment state of an order, independent of (but constrained by)
/// the workflow state: Confirmed requires Paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentState {
    /// No payment outcome yet.
    #[default]
    Pending,

    /// The charge succeeded.
    Paid,

    /// The charge failed.
    Failed,

    /// A refund completed after payment.
    Refunded,
}

impl PaymentState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "Pending",
            PaymentState::Paid => "Paid",
            PaymentState::Failed => "Failed",
            PaymentState::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
