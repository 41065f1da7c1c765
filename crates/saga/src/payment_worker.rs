//! Payment processor: drives the payment ledger from bus work items.

use std::sync::Arc;

use async_trait::async_trait;
use common::IdempotencyKey;
use event_bus::{EventBus, EventEnvelope, EventHandler, HandlerError};
use payment::{PaymentGateway, PaymentLedger, PaymentStatus};

use crate::error::Result;
use crate::events::{OrderEvent, PaymentRequestedData, RefundRequestedData};
use crate::topics::TOPIC_ORDERS;

/// Consumes `PaymentRequested` and `RefundRequested` work items, drives
/// the payment ledger, and publishes the outcomes back to the orders
/// topic.
///
/// The ledger's idempotency key makes redelivered charge requests
/// harmless; a refund whose gateway call fails is surfaced as a handler
/// error so the bus retries it (and dead-letters it once the budget is
/// exhausted).
pub struct PaymentProcessor<B: EventBus, G: PaymentGateway> {
    bus: Arc<B>,
    payments: Arc<PaymentLedger<G>>,
}

impl<B: EventBus, G: PaymentGateway> PaymentProcessor<B, G> {
    /// Creates a new payment processor.
    pub fn new(bus: Arc<B>, payments: Arc<PaymentLedger<G>>) -> Self {
        Self { bus, payments }
    }

    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_payment_requested(
        &self,
        data: PaymentRequestedData,
    ) -> Result<std::result::Result<(), HandlerError>> {
        let payment = self
            .payments
            .create_payment(
                data.idempotency_key.clone(),
                data.order_id,
                data.amount,
                data.currency,
            )
            .await?;

        match payment.status {
            PaymentStatus::Paid => {
                self.publish(OrderEvent::payment_succeeded(
                    data.order_id,
                    data.idempotency_key,
                ))
                .await?;
                Ok(Ok(()))
            }
            PaymentStatus::Failed => {
                let reason = payment.last_error().unwrap_or("charge failed").to_string();
                self.publish(OrderEvent::payment_failed(
                    data.order_id,
                    data.idempotency_key,
                    reason,
                ))
                .await?;
                Ok(Ok(()))
            }
            PaymentStatus::Refunded => {
                // Redelivery after the order was already refunded.
                Ok(Ok(()))
            }
            PaymentStatus::Pending => Ok(Err(HandlerError::new("charge left payment pending"))),
        }
    }

    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_refund_requested(
        &self,
        data: RefundRequestedData,
    ) -> Result<std::result::Result<(), HandlerError>> {
        let key = IdempotencyKey::for_order(data.order_id);
        let Some(payment) = self.payments.payment_for_key(&key).await else {
            return Ok(Err(HandlerError::new("no payment recorded for order")));
        };

        if payment.status == PaymentStatus::Refunded {
            self.publish(OrderEvent::refund_succeeded(data.order_id))
                .await?;
            return Ok(Ok(()));
        }

        let updated = self.payments.refund(payment.id, Some(data.amount)).await?;
        if updated.status == PaymentStatus::Refunded {
            self.publish(OrderEvent::refund_succeeded(data.order_id))
                .await?;
            Ok(Ok(()))
        } else {
            let reason = updated.last_error().unwrap_or("refund failed").to_string();
            Ok(Err(HandlerError::new(reason)))
        }
    }

    async fn publish(&self, event: OrderEvent) -> Result<()> {
        let envelope = event.envelope()?;
        self.bus.publish(TOPIC_ORDERS, envelope).await?;
        Ok(())
    }
}

#[async_trait]
impl<B: EventBus, G: PaymentGateway> EventHandler for PaymentProcessor<B, G> {
    async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        let event =
            OrderEvent::from_envelope(envelope).map_err(|e| HandlerError::new(e.to_string()))?;

        let result = match event {
            OrderEvent::PaymentRequested(data) => self.on_payment_requested(data).await,
            OrderEvent::RefundRequested(data) => self.on_refund_requested(data).await,
            other => {
                tracing::debug!(event_type = other.event_type(), "ignoring event");
                Ok(Ok(()))
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => Err(HandlerError::new(e.to_string())),
        }
    }
}
