//! The payment ledger: per-key serialized, idempotent charge handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{Currency, IdempotencyKey, Money, OrderId, PaymentId};
use tokio::sync::{Mutex, RwLock};

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayError, GatewayOutcome, PaymentGateway};
use crate::record::{Payment, PaymentTransaction, TransactionKind};

/// Configuration for the payment ledger.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Bound on any single gateway call. An elapsed timeout is recorded
    /// as a failed transaction, never left pending.
    pub gateway_timeout: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(5),
        }
    }
}

/// The idempotency and payment ledger.
///
/// Work on a given idempotency key is serialized through that key's
/// slot lock, so concurrent duplicate submissions produce exactly one
/// gateway charge: the loser of the race finds the winner's record and
/// returns it unchanged.
pub struct PaymentLedger<G: PaymentGateway> {
    config: PaymentConfig,
    gateway: G,
    /// idempotency key -> the payment created under that key.
    slots: RwLock<HashMap<IdempotencyKey, Arc<Mutex<Option<PaymentId>>>>>,
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl<G: PaymentGateway> PaymentLedger<G> {
    /// Creates a ledger over the given gateway with default configuration.
    pub fn new(gateway: G) -> Self {
        Self::with_config(gateway, PaymentConfig::default())
    }

    /// Creates a ledger over the given gateway.
    pub fn with_config(gateway: G, config: PaymentConfig) -> Self {
        Self {
            config,
            gateway,
            slots: RwLock::new(HashMap::new()),
            payments: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a payment and attempts the charge, or returns the
    /// existing record for a reused idempotency key.
    ///
    /// This is the system's sole duplicate-submission guard: a reused
    /// key returns the original payment as-is regardless of its current
    /// status, and no second charge is attempted.
    #[tracing::instrument(skip(self), fields(%idempotency_key, %order_id))]
    pub async fn create_payment(
        &self,
        idempotency_key: IdempotencyKey,
        order_id: OrderId,
        amount: Money,
        currency: Currency,
    ) -> Result<Payment> {
        let slot = {
            let mut slots = self.slots.write().await;
            slots.entry(idempotency_key.clone()).or_default().clone()
        };

        let mut slot_guard = slot.lock().await;
        if let Some(existing_id) = *slot_guard {
            metrics::counter!("payments_deduplicated_total").increment(1);
            tracing::info!(payment_id = %existing_id, "duplicate submission, returning original");
            let payments = self.payments.read().await;
            return Ok(payments
                .get(&existing_id)
                .cloned()
                .expect("slot points at stored payment"));
        }

        let mut payment = Payment::new(idempotency_key.clone(), order_id, amount, currency);
        let transaction = self.charge_with_timeout(amount, currency, &idempotency_key).await;
        payment.record(transaction)?;

        let snapshot = payment.clone();
        self.payments.write().await.insert(payment.id, payment);
        *slot_guard = Some(snapshot.id);

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(payment_id = %snapshot.id, status = %snapshot.status, "payment created");
        Ok(snapshot)
    }

    /// Appends a gateway transaction to a payment and recomputes its status.
    #[tracing::instrument(skip(self, transaction), fields(%payment_id))]
    pub async fn record_gateway_outcome(
        &self,
        payment_id: PaymentId,
        transaction: PaymentTransaction,
    ) -> Result<Payment> {
        let slot = self.slot_for_payment(payment_id).await?;
        let _slot_guard = slot.lock().await;

        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::UnknownPayment(payment_id))?;
        payment.record(transaction)?;
        Ok(payment.clone())
    }

    /// Refunds a paid payment, partially or in full.
    ///
    /// Fails with [`PaymentError::InvalidState`] unless the payment is
    /// Paid. A gateway failure is recorded as a failed transaction and
    /// leaves the payment Paid, so the refund can be retried.
    #[tracing::instrument(skip(self), fields(%payment_id))]
    pub async fn refund(&self, payment_id: PaymentId, amount: Option<Money>) -> Result<Payment> {
        let slot = self.slot_for_payment(payment_id).await?;
        let _slot_guard = slot.lock().await;

        let (charged, status, reference) = {
            let payments = self.payments.read().await;
            let payment = payments
                .get(&payment_id)
                .ok_or(PaymentError::UnknownPayment(payment_id))?;
            (
                payment.amount,
                payment.status,
                payment.charge_reference().map(str::to_string),
            )
        };

        if !status.can_refund() {
            return Err(PaymentError::InvalidState {
                payment_id,
                status,
                action: "refund",
            });
        }

        let amount = amount.unwrap_or(charged);
        if !amount.is_positive() || amount > charged {
            return Err(PaymentError::InvalidAmount {
                requested: amount,
                charged,
            });
        }

        let reference = reference.ok_or(PaymentError::MissingChargeReference(payment_id))?;
        let transaction = match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.refund(&reference, amount),
        )
        .await
        {
            Ok(Ok(GatewayOutcome::Approved { reference })) => {
                PaymentTransaction::succeeded(TransactionKind::Refund, amount, reference)
            }
            Ok(Ok(GatewayOutcome::Declined { reason })) => {
                PaymentTransaction::failed(TransactionKind::Refund, amount, reason)
            }
            Ok(Err(e)) => PaymentTransaction::failed(TransactionKind::Refund, amount, e.to_string()),
            Err(_) => PaymentTransaction::failed(
                TransactionKind::Refund,
                amount,
                GatewayError::Timeout.to_string(),
            ),
        };

        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::UnknownPayment(payment_id))?;
        payment.record(transaction)?;

        metrics::counter!("payments_refunds_total").increment(1);
        tracing::info!(status = %payment.status, "refund recorded");
        Ok(payment.clone())
    }

    /// Returns a snapshot of a payment.
    pub async fn payment(&self, payment_id: PaymentId) -> Option<Payment> {
        self.payments.read().await.get(&payment_id).cloned()
    }

    /// Returns a snapshot of the payment created under a key, if any.
    pub async fn payment_for_key(&self, idempotency_key: &IdempotencyKey) -> Option<Payment> {
        let slot = self.slots.read().await.get(idempotency_key).cloned()?;
        let payment_id = (*slot.lock().await)?;
        self.payments.read().await.get(&payment_id).cloned()
    }

    async fn charge_with_timeout(
        &self,
        amount: Money,
        currency: Currency,
        idempotency_key: &IdempotencyKey,
    ) -> PaymentTransaction {
        match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.charge(amount, currency, idempotency_key),
        )
        .await
        {
            Ok(Ok(GatewayOutcome::Approved { reference })) => {
                PaymentTransaction::succeeded(TransactionKind::Charge, amount, reference)
            }
            Ok(Ok(GatewayOutcome::Declined { reason })) => {
                PaymentTransaction::failed(TransactionKind::Charge, amount, reason)
            }
            Ok(Err(e)) => PaymentTransaction::failed(TransactionKind::Charge, amount, e.to_string()),
            Err(_) => {
                metrics::counter!("payments_gateway_timeouts_total").increment(1);
                tracing::warn!("gateway charge timed out");
                PaymentTransaction::failed(
                    TransactionKind::Charge,
                    amount,
                    GatewayError::Timeout.to_string(),
                )
            }
        }
    }

    async fn slot_for_payment(&self, payment_id: PaymentId) -> Result<Arc<Mutex<Option<PaymentId>>>> {
        let key = {
            let payments = self.payments.read().await;
            payments
                .get(&payment_id)
                .ok_or(PaymentError::UnknownPayment(payment_id))?
                .idempotency_key
                .clone()
        };
        let slots = self.slots.read().await;
        Ok(slots
            .get(&key)
            .cloned()
            .expect("every stored payment has a key slot"))
    }
}
