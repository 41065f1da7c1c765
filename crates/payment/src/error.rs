//! Payment error types.

use common::{Money, PaymentId};
use thiserror::Error;

use crate::record::PaymentStatus;

/// Errors that can occur during payment ledger operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Attempted transition from a terminal or incompatible state.
    #[error("Invalid payment state: cannot {action} payment {payment_id} in {status} state")]
    InvalidState {
        payment_id: PaymentId,
        status: PaymentStatus,
        action: &'static str,
    },

    /// No payment exists with the given ID.
    #[error("Unknown payment: {0}")]
    UnknownPayment(PaymentId),

    /// A refund amount outside the charged amount.
    #[error("Invalid refund amount {requested} for payment charged {charged}")]
    InvalidAmount { requested: Money, charged: Money },

    /// The charge has no gateway reference to refund against.
    #[error("Payment {0} has no successful charge to refund")]
    MissingChargeReference(PaymentId),
}

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;
