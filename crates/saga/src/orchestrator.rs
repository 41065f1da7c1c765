//! The order saga orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Currency, IdempotencyKey, OrderId, Sku};
use event_bus::{EventBus, EventEnvelope, EventHandler, HandlerError};
use futures_util::future::join_all;
use inventory::{InventoryError, InventoryLedger, ReleaseReason, ReservationStatus};

use crate::error::{Result, SagaError};
use crate::events::{
    CancelRequestedData, OrderCreatedData, OrderEvent, PaymentFailedData, PaymentSucceededData,
    RefundSucceededData, StockRejectedData, StockReservedData,
};
use crate::order::{Order, PricingPolicy};
use crate::status::{OrderStatus, PaymentState};
use crate::store::OrderStore;
use crate::topics::{TOPIC_ORDER_STATUS, TOPIC_ORDERS, TOPIC_PAYMENTS};

/// Drives the order state machine by consuming and producing events.
///
/// Consumes the `orders` topic: order creation triggers reservation of
/// every line item; full reservation triggers a payment request; payment
/// outcomes either commit the reservations (order confirmed) or release
/// them (order cancelled). Every forward step has a compensating reverse
/// step, and every handler is safe under event redelivery.
pub struct OrderSagaOrchestrator<B: EventBus> {
    bus: Arc<B>,
    inventory: Arc<InventoryLedger>,
    orders: Arc<dyn OrderStore>,
    pricing: PricingPolicy,
    currency: Currency,
}

impl<B: EventBus> OrderSagaOrchestrator<B> {
    /// Creates a new orchestrator.
    pub fn new(
        bus: Arc<B>,
        inventory: Arc<InventoryLedger>,
        orders: Arc<dyn OrderStore>,
        pricing: PricingPolicy,
        currency: Currency,
    ) -> Self {
        Self {
            bus,
            inventory,
            orders,
            pricing,
            currency,
        }
    }

    /// Handles order creation: store the order and claim stock for every line.
    ///
    /// Line items are reserved concurrently (different SKUs are
    /// independent). The order only proceeds to payment once all
    /// reservations succeed; if any fails, reservations already acquired
    /// for this order are released again.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_order_created(&self, data: OrderCreatedData) -> Result<()> {
        if data.lines.is_empty() {
            return Err(SagaError::EmptyOrder(data.order_id));
        }

        let order = self
            .orders
            .create(Order::new(data.order_id, data.lines, &self.pricing))
            .await?;

        if order.status != OrderStatus::Pending {
            tracing::debug!(status = %order.status, "order already progressed, ignoring redelivery");
            return Ok(());
        }

        let results = join_all(order.lines.iter().map(|line| {
            self.inventory
                .reserve(order.id, line.sku.clone(), line.quantity)
        }))
        .await;

        let mut rejection: Option<(Sku, InventoryError)> = None;
        let mut granted = Vec::new();
        for (line, result) in order.lines.iter().zip(results) {
            match result {
                Ok(reservation) => granted.push(reservation),
                Err(e) => {
                    if rejection.is_none() {
                        rejection = Some((line.sku.clone(), e));
                    }
                }
            }
        }

        match rejection {
            None => {
                tracing::info!(lines = order.lines.len(), "all line items reserved");
                self.publish(TOPIC_ORDERS, OrderEvent::stock_reserved(order.id))
                    .await
            }
            Some((sku, e)) => {
                tracing::info!(%sku, error = %e, "line item rejected, rolling back siblings");
                for reservation in granted {
                    if reservation.status == ReservationStatus::Active {
                        self.inventory
                            .release(reservation.id, ReleaseReason::StockRejected)
                            .await?;
                    }
                }
                self.publish(
                    TOPIC_ORDERS,
                    OrderEvent::stock_rejected(order.id, sku, e.to_string()),
                )
                .await
            }
        }
    }

    /// Handles full reservation: request payment for the order total.
    ///
    /// The idempotency key is derived from the order ID, so a redelivered
    /// request can never charge twice.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_stock_reserved(&self, data: StockReservedData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        if order.status != OrderStatus::Pending || order.payment_state != PaymentState::Pending {
            tracing::debug!(status = %order.status, "order already progressed, ignoring redelivery");
            return Ok(());
        }

        self.publish(
            TOPIC_PAYMENTS,
            OrderEvent::payment_requested(
                order.id,
                order.total(),
                self.currency,
                IdempotencyKey::for_order(order.id),
            ),
        )
        .await
    }

    /// Handles a rejected line item: compensate and cancel the order.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_stock_rejected(&self, data: StockRejectedData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(());
        }

        self.release_active(order.id, ReleaseReason::StockRejected)
            .await?;

        let reason = format!("stock rejected for {}: {}", data.sku, data.reason);
        let updated = self
            .orders
            .set_status(
                order.id,
                OrderStatus::Cancelled,
                order.payment_state,
                &reason,
            )
            .await?;

        metrics::counter!("saga_orders_cancelled_total").increment(1);
        self.publish_status(&updated).await
    }

    /// Handles payment success: commit every reservation, confirm the order.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_payment_succeeded(&self, data: PaymentSucceededData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        if order.status == OrderStatus::Confirmed {
            return Ok(());
        }
        if !order.status.can_confirm() {
            tracing::warn!(status = %order.status, "payment succeeded for non-pending order");
            return Ok(());
        }

        for reservation in self.inventory.reservations_for_order(order.id).await {
            if reservation.status == ReservationStatus::Active {
                self.inventory.commit(reservation.id).await?;
            }
        }

        let updated = self
            .orders
            .set_status(
                order.id,
                OrderStatus::Confirmed,
                PaymentState::Paid,
                "payment captured",
            )
            .await?;

        metrics::counter!("saga_orders_confirmed_total").increment(1);
        self.publish_status(&updated).await
    }

    /// Handles payment failure: release every reservation, cancel the order.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_payment_failed(&self, data: PaymentFailedData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(());
        }
        if order.status != OrderStatus::Pending {
            tracing::warn!(status = %order.status, "payment failed for non-pending order");
            return Ok(());
        }

        self.release_active(order.id, ReleaseReason::PaymentFailed)
            .await?;

        let reason = format!("payment failed: {}", data.reason);
        let updated = self
            .orders
            .set_status(
                order.id,
                OrderStatus::Cancelled,
                PaymentState::Failed,
                &reason,
            )
            .await?;

        metrics::counter!("saga_orders_cancelled_total").increment(1);
        self.publish_status(&updated).await
    }

    /// Handles a cancellation request.
    ///
    /// A pending order releases its active reservations. A confirmed,
    /// paid order keeps its stock committed and emits a refund request;
    /// the committed units only matter to accounting once the refund
    /// completes, and stock must not reappear before the money moves.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_cancel_requested(&self, data: CancelRequestedData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        match order.status {
            OrderStatus::Cancelled => Ok(()),
            OrderStatus::Pending => {
                self.release_active(order.id, ReleaseReason::OrderCancelled)
                    .await?;
                let updated = self
                    .orders
                    .set_status(
                        order.id,
                        OrderStatus::Cancelled,
                        order.payment_state,
                        &data.reason,
                    )
                    .await?;
                metrics::counter!("saga_orders_cancelled_total").increment(1);
                self.publish_status(&updated).await
            }
            OrderStatus::Confirmed => {
                let updated = self
                    .orders
                    .set_status(
                        order.id,
                        OrderStatus::Cancelled,
                        order.payment_state,
                        &data.reason,
                    )
                    .await?;
                metrics::counter!("saga_orders_cancelled_total").increment(1);
                self.publish_status(&updated).await?;

                if order.payment_state == PaymentState::Paid {
                    self.publish(
                        TOPIC_PAYMENTS,
                        OrderEvent::refund_requested(order.id, order.total()),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Handles refund completion: the order was already cancelled and its
    /// stock stays deducted; only the payment axis moves.
    #[tracing::instrument(skip(self, data), fields(order_id = %data.order_id))]
    async fn on_refund_succeeded(&self, data: RefundSucceededData) -> Result<()> {
        let order = self.require_order(data.order_id).await?;
        if order.payment_state == PaymentState::Refunded {
            return Ok(());
        }
        if order.status != OrderStatus::Cancelled {
            tracing::warn!(status = %order.status, "refund succeeded for non-cancelled order");
            return Ok(());
        }

        let updated = self
            .orders
            .set_status(
                order.id,
                OrderStatus::Cancelled,
                PaymentState::Refunded,
                "refund completed",
            )
            .await?;

        metrics::counter!("saga_orders_refunded_total").increment(1);
        self.publish_status(&updated).await
    }

    async fn release_active(&self, order_id: OrderId, reason: ReleaseReason) -> Result<()> {
        for reservation in self.inventory.reservations_for_order(order_id).await {
            if reservation.status == ReservationStatus::Active {
                self.inventory.release(reservation.id, reason).await?;
            }
        }
        Ok(())
    }

    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))
    }

    async fn publish(&self, topic: &str, event: OrderEvent) -> Result<()> {
        let envelope = event.envelope()?;
        self.bus.publish(topic, envelope).await?;
        Ok(())
    }

    async fn publish_status(&self, order: &Order) -> Result<()> {
        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            payment_state = %order.payment_state,
            "order status changed"
        );
        self.publish(
            TOPIC_ORDER_STATUS,
            OrderEvent::order_status_changed(order.id, order.status, order.payment_state),
        )
        .await
    }
}

#[async_trait]
impl<B: EventBus> EventHandler for OrderSagaOrchestrator<B> {
    async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        let event =
            OrderEvent::from_envelope(envelope).map_err(|e| HandlerError::new(e.to_string()))?;
        metrics::counter!("saga_events_total", "event" => event.event_type()).increment(1);

        let result = match event {
            OrderEvent::OrderCreated(data) => self.on_order_created(data).await,
            OrderEvent::StockReserved(data) => self.on_stock_reserved(data).await,
            OrderEvent::StockRejected(data) => self.on_stock_rejected(data).await,
            OrderEvent::PaymentSucceeded(data) => self.on_payment_succeeded(data).await,
            OrderEvent::PaymentFailed(data) => self.on_payment_failed(data).await,
            OrderEvent::CancelRequested(data) => self.on_cancel_requested(data).await,
            OrderEvent::RefundSucceeded(data) => self.on_refund_succeeded(data).await,
            other => {
                tracing::debug!(event_type = other.event_type(), "ignoring event");
                Ok(())
            }
        };

        result.map_err(|e| HandlerError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOrderStore;
    use common::{Money, OrderLine, ProductId};
    use event_bus::InMemoryEventBus;

    struct Fixture {
        orchestrator: OrderSagaOrchestrator<InMemoryEventBus>,
        inventory: Arc<InventoryLedger>,
        orders: Arc<InMemoryOrderStore>,
    }

    /// Orchestrator wired to a bus with no subscribers: published events
    /// go nowhere, so individual handlers can be driven directly.
    fn make_fixture() -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        let inventory = Arc::new(InventoryLedger::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let orchestrator = OrderSagaOrchestrator::new(
            bus,
            Arc::clone(&inventory),
            orders.clone() as Arc<dyn OrderStore>,
            PricingPolicy::default(),
            Currency::Usd,
        );
        Fixture {
            orchestrator,
            inventory,
            orders,
        }
    }

    async fn stock(fixture: &Fixture, sku: &str, total: u32) {
        fixture
            .inventory
            .stock(Sku::new(sku), ProductId::new(), total, 0)
            .await
            .unwrap();
    }

    fn two_lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new(
                ProductId::new(),
                "SKU-001",
                "Widget",
                2,
                Money::from_cents(1000),
            ),
            OrderLine::new(
                ProductId::new(),
                "SKU-002",
                "Gadget",
                1,
                Money::from_cents(2500),
            ),
        ]
    }

    async fn deliver(fixture: &Fixture, event: OrderEvent) {
        fixture
            .orchestrator
            .handle(&event.envelope().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_order_created_reserves_every_line() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;

        let reservations = fixture.inventory.reservations_for_order(order_id).await;
        assert_eq!(reservations.len(), 2);
        assert!(reservations
            .iter()
            .all(|r| r.status == ReservationStatus::Active));

        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_order_created_redelivery_does_not_double_reserve() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;

        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, 2);
    }

    #[tokio::test]
    async fn test_partial_failure_releases_sibling_reservations() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 0).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;

        // The in-stock sibling was reserved, then released again.
        let reservations = fixture.inventory.reservations_for_order(order_id).await;
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].status, ReservationStatus::Released);
        assert_eq!(
            reservations[0].release_reason,
            Some(ReleaseReason::StockRejected)
        );

        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.available(), 10);
    }

    #[tokio::test]
    async fn test_empty_order_is_a_handler_error() {
        let fixture = make_fixture();
        let event = OrderEvent::order_created(OrderId::new(), vec![]);
        let result = fixture.orchestrator.handle(&event.envelope().unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_payment_succeeded_commits_and_confirms() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(
            &fixture,
            OrderEvent::payment_succeeded(order_id, IdempotencyKey::for_order(order_id)),
        )
        .await;

        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_state, PaymentState::Paid);

        // Stock permanently deducted.
        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 8);
        assert_eq!(item.reserved, 0);
    }

    #[tokio::test]
    async fn test_payment_failed_releases_and_cancels() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(
            &fixture,
            OrderEvent::payment_failed(
                order_id,
                IdempotencyKey::for_order(order_id),
                "card declined",
            ),
        )
        .await;

        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_state, PaymentState::Failed);

        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.available(), 10);
        assert_eq!(item.total, 10);
    }

    #[tokio::test]
    async fn test_cancel_pending_order_releases_stock() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(
            &fixture,
            OrderEvent::cancel_requested(order_id, "customer changed mind"),
        )
        .await;

        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let reservations = fixture.inventory.reservations_for_order(order_id).await;
        assert!(reservations
            .iter()
            .all(|r| r.status == ReservationStatus::Released));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_order_keeps_stock_committed() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(
            &fixture,
            OrderEvent::payment_succeeded(order_id, IdempotencyKey::for_order(order_id)),
        )
        .await;
        deliver(
            &fixture,
            OrderEvent::cancel_requested(order_id, "customer changed mind"),
        )
        .await;

        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_state, PaymentState::Paid);

        // No spurious available increase before the refund completes.
        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 8);
        assert_eq!(item.available(), 8);

        deliver(&fixture, OrderEvent::refund_succeeded(order_id)).await;
        let order = fixture.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_state, PaymentState::Refunded);

        let item = fixture.inventory.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 8);
    }

    #[tokio::test]
    async fn test_cancel_redelivery_is_noop() {
        let fixture = make_fixture();
        stock(&fixture, "SKU-001", 10).await;
        stock(&fixture, "SKU-002", 10).await;

        let order_id = OrderId::new();
        deliver(&fixture, OrderEvent::order_created(order_id, two_lines())).await;
        deliver(&fixture, OrderEvent::cancel_requested(order_id, "first")).await;
        deliver(&fixture, OrderEvent::cancel_requested(order_id, "second")).await;

        let history = fixture.orders.history(order_id).await.unwrap();
        // Submitted + one cancellation; the redelivery appended nothing.
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_order_is_a_handler_error() {
        let fixture = make_fixture();
        let event = OrderEvent::cancel_requested(OrderId::new(), "no such order");
        let result = fixture.orchestrator.handle(&event.envelope().unwrap()).await;
        assert!(result.is_err());
    }
}
