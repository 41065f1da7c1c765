//! Payment records and their state machine.

use chrono::{DateTime, Utc};
use common::{Currency, IdempotencyKey, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

/// The state of a payment in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Paid ──► Refunded
///           └──► Failed
/// ```
///
/// Failed and Refunded are terminal for this record; retrying after a
/// failure requires a new idempotency key, i.e. a new logical payment
/// attempt. The ledger never flips a Failed record back to Paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Created, no gateway outcome recorded yet.
    #[default]
    Pending,

    /// A charge succeeded.
    Paid,

    /// The charge failed with no prior success (terminal state).
    Failed,

    /// A refund succeeded after payment (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Returns true if a refund can be issued in this state.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a gateway interaction attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Money moved from the customer.
    Charge,

    /// Money returned to the customer.
    Refund,
}

/// How a gateway interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// The gateway approved the operation.
    Succeeded,

    /// The gateway declined, errored, or timed out.
    Failed,
}

/// One recorded gateway interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Charge or refund.
    pub kind: TransactionKind,

    /// Success or failure.
    pub outcome: TransactionOutcome,

    /// Amount the interaction covered.
    pub amount: Money,

    /// Gateway reference on success (e.g. a charge ID).
    pub reference: Option<String>,

    /// Error description on failure.
    pub error: Option<String>,

    /// When the interaction was recorded.
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Records a successful interaction.
    pub fn succeeded(kind: TransactionKind, amount: Money, reference: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: TransactionOutcome::Succeeded,
            amount,
            reference: Some(reference.into()),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Records a failed interaction.
    pub fn failed(kind: TransactionKind, amount: Money, error: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: TransactionOutcome::Failed,
            amount,
            reference: None,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

/// A payment record: one idempotency key, one logical charge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Generated identity.
    pub id: PaymentId,

    /// Caller-supplied deduplication key; unique across all payments.
    pub idempotency_key: IdempotencyKey,

    /// The order being paid for.
    pub order_id: OrderId,

    /// Amount to charge.
    pub amount: Money,

    /// Currency of the charge.
    pub currency: Currency,

    /// Current lifecycle state, recomputed from the transactions.
    pub status: PaymentStatus,

    /// Ordered gateway interactions for this payment.
    pub transactions: Vec<PaymentTransaction>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new pending payment.
    pub fn new(
        idempotency_key: IdempotencyKey,
        order_id: OrderId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            idempotency_key,
            order_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            transactions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Appends a transaction and recomputes the status.
    ///
    /// Status moves monotonically: a successful charge sets Paid only
    /// from Pending; a failed charge sets Failed only when no charge has
    /// succeeded; a successful refund sets Refunded only from Paid.
    /// A transaction that would move status backwards is rejected.
    pub fn record(&mut self, transaction: PaymentTransaction) -> Result<(), PaymentError> {
        match (transaction.kind, transaction.outcome) {
            (TransactionKind::Charge, TransactionOutcome::Succeeded) => {
                if self.status != PaymentStatus::Pending {
                    return Err(PaymentError::InvalidState {
                        payment_id: self.id,
                        status: self.status,
                        action: "record successful charge",
                    });
                }
                self.status = PaymentStatus::Paid;
            }
            (TransactionKind::Charge, TransactionOutcome::Failed) => {
                // A failed charge only fails the payment when nothing
                // has succeeded yet.
                if self.status == PaymentStatus::Pending {
                    self.status = PaymentStatus::Failed;
                }
            }
            (TransactionKind::Refund, TransactionOutcome::Succeeded) => {
                if self.status != PaymentStatus::Paid {
                    return Err(PaymentError::InvalidState {
                        payment_id: self.id,
                        status: self.status,
                        action: "record successful refund",
                    });
                }
                self.status = PaymentStatus::Refunded;
            }
            (TransactionKind::Refund, TransactionOutcome::Failed) => {
                // Recorded for audit; the payment stays Paid.
            }
        }

        self.transactions.push(transaction);
        Ok(())
    }

    /// Returns the gateway reference of the successful charge, if any.
    pub fn charge_reference(&self) -> Option<&str> {
        self.transactions
            .iter()
            .find(|t| {
                t.kind == TransactionKind::Charge && t.outcome == TransactionOutcome::Succeeded
            })
            .and_then(|t| t.reference.as_deref())
    }

    /// Returns the error of the most recent failed transaction, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.transactions
            .iter()
            .rev()
            .find(|t| t.outcome == TransactionOutcome::Failed)
            .and_then(|t| t.error.as_deref())
    }
}
