//! Saga event vocabulary.
//!
//! These are the event shapes crossing the bus: inbound triggers
//! consumed by the orchestrator, work items for the payment processor,
//! and outbound notifications for external consumers.

use common::{Currency, IdempotencyKey, Money, OrderId, OrderLine, Sku};
use event_bus::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::status::{OrderStatus, PaymentState};

/// Events produced and consumed by the order fulfillment saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// An order was submitted and needs fulfillment.
    OrderCreated(OrderCreatedData),

    /// Every line item of the order was reserved.
    StockReserved(StockReservedData),

    /// At least one line item could not be reserved.
    StockRejected(StockRejectedData),

    /// The orchestrator requests a charge for the order.
    PaymentRequested(PaymentRequestedData),

    /// The charge for the order succeeded.
    PaymentSucceeded(PaymentSucceededData),

    /// The charge for the order failed.
    PaymentFailed(PaymentFailedData),

    /// A cancellation was requested for the order.
    CancelRequested(CancelRequestedData),

    /// The orchestrator requests a refund for a paid, cancelled order.
    RefundRequested(RefundRequestedData),

    /// The refund for the order completed.
    RefundSucceeded(RefundSucceededData),

    /// The order's status pair changed (consumed externally).
    OrderStatusChanged(OrderStatusChangedData),
}

impl OrderEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::StockReserved(_) => "StockReserved",
            OrderEvent::StockRejected(_) => "StockRejected",
            OrderEvent::PaymentRequested(_) => "PaymentRequested",
            OrderEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::CancelRequested(_) => "CancelRequested",
            OrderEvent::RefundRequested(_) => "RefundRequested",
            OrderEvent::RefundSucceeded(_) => "RefundSucceeded",
            OrderEvent::OrderStatusChanged(_) => "OrderStatusChanged",
        }
    }

    /// Returns the order this event belongs to (the delivery ordering key).
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderCreated(data) => data.order_id,
            OrderEvent::StockReserved(data) => data.order_id,
            OrderEvent::StockRejected(data) => data.order_id,
            OrderEvent::PaymentRequested(data) => data.order_id,
            OrderEvent::PaymentSucceeded(data) => data.order_id,
            OrderEvent::PaymentFailed(data) => data.order_id,
            OrderEvent::CancelRequested(data) => data.order_id,
            OrderEvent::RefundRequested(data) => data.order_id,
            OrderEvent::RefundSucceeded(data) => data.order_id,
            OrderEvent::OrderStatusChanged(data) => data.order_id,
        }
    }

    /// Wraps the event into a bus envelope.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        Ok(EventEnvelope::builder()
            .event_type(self.event_type())
            .order_id(self.order_id())
            .payload(self)?
            .build())
    }

    /// Parses an event back out of a bus envelope payload.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, serde_json::Error> {
        serde_json::from_value(envelope.payload.clone())
    }
}

/// Data for OrderCreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    /// The new order.
    pub order_id: OrderId,
    /// Line items to reserve and charge for.
    pub lines: Vec<OrderLine>,
}

/// Data for StockReserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservedData {
    /// The fully reserved order.
    pub order_id: OrderId,
}

/// Data for StockRejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRejectedData {
    /// The order that could not be fully reserved.
    pub order_id: OrderId,
    /// The SKU that was short.
    pub sku: Sku,
    /// Why the reservation was rejected.
    pub reason: String,
}

/// Data for PaymentRequested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestedData {
    /// The order to charge for.
    pub order_id: OrderId,
    /// Amount to charge.
    pub amount: Money,
    /// Currency of the charge.
    pub currency: Currency,
    /// Deduplication key for the charge attempt.
    pub idempotency_key: IdempotencyKey,
}

/// Data for PaymentSucceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    /// The paid order.
    pub order_id: OrderId,
    /// The key the charge was made under.
    pub idempotency_key: IdempotencyKey,
}

/// Data for PaymentFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    /// The order whose charge failed.
    pub order_id: OrderId,
    /// The key the charge was attempted under.
    pub idempotency_key: IdempotencyKey,
    /// Why the charge failed.
    pub reason: String,
}

/// Data for CancelRequested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequestedData {
    /// The order to cancel.
    pub order_id: OrderId,
    /// Why cancellation was requested.
    pub reason: String,
}

/// Data for RefundRequested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequestedData {
    /// The cancelled, paid order to refund.
    pub order_id: OrderId,
    /// Amount to refund.
    pub amount: Money,
}

/// Data for RefundSucceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSucceededData {
    /// The refunded order.
    pub order_id: OrderId,
}

/// Data for OrderStatusChanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    /// The order whose status changed.
    pub order_id: OrderId,
    /// New workflow state.
    pub status: OrderStatus,
    /// New payment state.
    pub payment_state: PaymentState,
}

// Convenience constructors
impl OrderEvent {
    /// Creates an OrderCreated event.
    pub fn order_created(order_id: OrderId, lines: Vec<OrderLine>) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData { order_id, lines })
    }

    /// Creates a StockReserved event.
    pub fn stock_reserved(order_id: OrderId) -> Self {
        OrderEvent::StockReserved(StockReservedData { order_id })
    }

    /// Creates a StockRejected event.
    pub fn stock_rejected(order_id: OrderId, sku: Sku, reason: impl Into<String>) -> Self {
        OrderEvent::StockRejected(StockRejectedData {
            order_id,
            sku,
            reason: reason.into(),
        })
    }

    /// Creates a PaymentRequested event.
    pub fn payment_requested(
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        OrderEvent::PaymentRequested(PaymentRequestedData {
            order_id,
            amount,
            currency,
            idempotency_key,
        })
    }

    /// Creates a PaymentSucceeded event.
    pub fn payment_succeeded(order_id: OrderId, idempotency_key: IdempotencyKey) -> Self {
        OrderEvent::PaymentSucceeded(PaymentSucceededData {
            order_id,
            idempotency_key,
        })
    }

    /// Creates a PaymentFailed event.
    pub fn payment_failed(
        order_id: OrderId,
        idempotency_key: IdempotencyKey,
        reason: impl Into<String>,
    ) -> Self {
        OrderEvent::PaymentFailed(PaymentFailedData {
            order_id,
            idempotency_key,
            reason: reason.into(),
        })
    }

    /// Creates a CancelRequested event.
    pub fn cancel_requested(order_id: OrderId, reason: impl Into<String>) -> Self {
        OrderEvent::CancelRequested(CancelRequestedData {
            order_id,
            reason: reason.into(),
        })
    }

    /// Creates a RefundRequested event.
    pub fn refund_requested(order_id: OrderId, amount: Money) -> Self {
        OrderEvent::RefundRequested(RefundRequestedData { order_id, amount })
    }

    /// Creates a RefundSucceeded event.
    pub fn refund_succeeded(order_id: OrderId) -> Self {
        OrderEvent::RefundSucceeded(RefundSucceededData { order_id })
    }

    /// Creates an OrderStatusChanged event.
    pub fn order_status_changed(
        order_id: OrderId,
        status: OrderStatus,
        payment_state: PaymentState,
    ) -> Self {
        OrderEvent::OrderStatusChanged(OrderStatusChangedData {
            order_id,
            status,
            payment_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let order_id = OrderId::new();

        assert_eq!(
            OrderEvent::order_created(order_id, vec![]).event_type(),
            "OrderCreated"
        );
        assert_eq!(
            OrderEvent::stock_reserved(order_id).event_type(),
            "StockReserved"
        );
        assert_eq!(
            OrderEvent::stock_rejected(order_id, Sku::new("SKU-001"), "out of stock").event_type(),
            "StockRejected"
        );
        assert_eq!(
            OrderEvent::payment_requested(
                order_id,
                Money::from_cents(100),
                Currency::Usd,
                IdempotencyKey::for_order(order_id),
            )
            .event_type(),
            "PaymentRequested"
        );
        assert_eq!(
            OrderEvent::payment_succeeded(order_id, IdempotencyKey::for_order(order_id))
                .event_type(),
            "PaymentSucceeded"
        );
        assert_eq!(
            OrderEvent::payment_failed(
                order_id,
                IdempotencyKey::for_order(order_id),
                "card declined"
            )
            .event_type(),
            "PaymentFailed"
        );
        assert_eq!(
            OrderEvent::cancel_requested(order_id, "customer changed mind").event_type(),
            "CancelRequested"
        );
        assert_eq!(
            OrderEvent::refund_requested(order_id, Money::from_cents(100)).event_type(),
            "RefundRequested"
        );
        assert_eq!(
            OrderEvent::refund_succeeded(order_id).event_type(),
            "RefundSucceeded"
        );
        assert_eq!(
            OrderEvent::order_status_changed(order_id, OrderStatus::Pending, PaymentState::Pending)
                .event_type(),
            "OrderStatusChanged"
        );
    }

    #[test]
    fn test_order_id_accessor() {
        let order_id = OrderId::new();
        let event = OrderEvent::cancel_requested(order_id, "test");
        assert_eq!(event.order_id(), order_id);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let order_id = OrderId::new();
        let event = OrderEvent::stock_rejected(order_id, Sku::new("SKU-001"), "out of stock");

        let envelope = event.envelope().unwrap();
        assert_eq!(envelope.event_type, "StockRejected");
        assert_eq!(envelope.order_id, order_id);

        let parsed = OrderEvent::from_envelope(&envelope).unwrap();
        if let OrderEvent::StockRejected(data) = parsed {
            assert_eq!(data.order_id, order_id);
            assert_eq!(data.sku, Sku::new("SKU-001"));
            assert_eq!(data.reason, "out of stock");
        } else {
            panic!("expected StockRejected event");
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let order_id = OrderId::new();
        let events = vec![
            OrderEvent::order_created(order_id, vec![]),
            OrderEvent::stock_reserved(order_id),
            OrderEvent::stock_rejected(order_id, Sku::new("SKU-001"), "out of stock"),
            OrderEvent::payment_succeeded(order_id, IdempotencyKey::for_order(order_id)),
            OrderEvent::payment_failed(order_id, IdempotencyKey::for_order(order_id), "declined"),
            OrderEvent::cancel_requested(order_id, "changed mind"),
            OrderEvent::refund_requested(order_id, Money::from_cents(500)),
            OrderEvent::refund_succeeded(order_id),
            OrderEvent::order_status_changed(order_id, OrderStatus::Cancelled, PaymentState::Failed),
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let deserialized: OrderEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(event.event_type(), deserialized.event_type());
            assert_eq!(event.order_id(), deserialized.order_id());
        }
    }
}
