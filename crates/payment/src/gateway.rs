//! Payment gateway capability trait and in-memory implementation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, IdempotencyKey, Money};
use thiserror::Error;

/// Outcome of a gateway call that reached the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The provider approved the operation.
    Approved {
        /// Provider-side reference for the operation.
        reference: String,
    },

    /// The provider declined the operation (a business outcome, not a fault).
    Declined {
        /// Provider-supplied decline reason.
        reason: String,
    },
}

/// Faults reaching or talking to the provider.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The call did not complete within the configured bound.
    #[error("gateway call timed out")]
    Timeout,

    /// The provider was unreachable or returned a malformed response.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Opaque payment gateway capability.
///
/// The commerce core treats the provider as a black box returning
/// success or failure; provider-specific protocol details live behind
/// this trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the given amount.
    ///
    /// The idempotency key is forwarded so providers that support it can
    /// deduplicate on their side as well.
    async fn charge(
        &self,
        amount: Money,
        currency: Currency,
        idempotency_key: &IdempotencyKey,
    ) -> Result<GatewayOutcome, GatewayError>;

    /// Refunds part or all of a previous charge.
    async fn refund(&self, reference: &str, amount: Money) -> Result<GatewayOutcome, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: Vec<(IdempotencyKey, Money)>,
    refunds: Vec<(String, Money)>,
    next_ref: u32,
    decline_on_charge: bool,
    fail_on_charge: bool,
    fail_on_refund: bool,
    charge_delay: Option<Duration>,
}

/// In-memory gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline charge attempts.
    pub fn set_decline_on_charge(&self, decline: bool) {
        self.state.lock().unwrap().decline_on_charge = decline;
    }

    /// Configures the gateway to fail charge attempts with an infrastructure error.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.lock().unwrap().fail_on_charge = fail;
    }

    /// Configures the gateway to fail refund attempts.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.lock().unwrap().fail_on_refund = fail;
    }

    /// Delays charge calls, for exercising caller-side timeouts.
    pub fn set_charge_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().charge_delay = delay;
    }

    /// Returns how many charges reached the provider.
    pub fn charge_count(&self) -> usize {
        self.state.lock().unwrap().charges.len()
    }

    /// Returns how many refunds reached the provider.
    pub fn refund_count(&self) -> usize {
        self.state.lock().unwrap().refunds.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn charge(
        &self,
        amount: Money,
        _currency: Currency,
        idempotency_key: &IdempotencyKey,
    ) -> Result<GatewayOutcome, GatewayError> {
        let delay = self.state.lock().unwrap().charge_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_on_charge {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if state.decline_on_charge {
            return Ok(GatewayOutcome::Declined {
                reason: "card declined".to_string(),
            });
        }

        state.next_ref += 1;
        let reference = format!("ch_{:06}", state.next_ref);
        state.charges.push((idempotency_key.clone(), amount));
        Ok(GatewayOutcome::Approved { reference })
    }

    async fn refund(&self, reference: &str, amount: Money) -> Result<GatewayOutcome, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on_refund {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        state.next_ref += 1;
        let refund_reference = format!("re_{:06}", state.next_ref);
        state.refunds.push((reference.to_string(), amount));
        Ok(GatewayOutcome::Approved {
            reference: refund_reference,
        })
    }
}
