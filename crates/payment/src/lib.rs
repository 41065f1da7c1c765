//! Idempotency and payment ledger for the commerce core.
//!
//! Owns payment state and deduplication of payment requests. A given
//! idempotency key maps to exactly one payment record regardless of how
//! many times the create-payment request is retried: duplicate
//! submissions return the original result rather than creating a second
//! charge. The external gateway is an opaque capability behind the
//! [`PaymentGateway`] trait and is called under a bounded timeout.

pub mod error;
pub mod gateway;
pub mod ledger;
pub mod record;

pub use error::{PaymentError, Result};
pub use gateway::{GatewayError, GatewayOutcome, InMemoryGateway, PaymentGateway};
pub use ledger::{PaymentConfig, PaymentLedger};
pub use record::{
    Payment, PaymentStatus, PaymentTransaction, TransactionKind, TransactionOutcome,
};
