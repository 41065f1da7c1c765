//! Service runtime for the commerce core.
//!
//! Wires the event bus, inventory ledger, payment ledger, and saga
//! orchestrator into one process with explicitly constructed, injected
//! dependencies: acquire on start, release on shutdown, no ambient
//! global state. Exposes health and metrics endpoints with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use common::{Currency, Money};
use event_bus::{BusConfig, EventBus, InMemoryEventBus, RetryPolicy};
use inventory::{InventoryLedger, LedgerConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use payment::{InMemoryGateway, PaymentConfig, PaymentLedger};
use saga::topics::{GROUP_ORCHESTRATOR, GROUP_PAYMENT_PROCESSOR, TOPIC_ORDERS, TOPIC_PAYMENTS};
use saga::{
    InMemoryOrderStore, OrderSagaOrchestrator, OrderStore, PaymentProcessor, PricingPolicy,
};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub use config::Config;

/// The wired commerce core: every dependency explicitly constructed,
/// shared through `Arc`, torn down via [`Platform::shutdown`].
pub struct Platform {
    pub bus: Arc<InMemoryEventBus>,
    pub inventory: Arc<InventoryLedger>,
    pub payments: Arc<PaymentLedger<InMemoryGateway>>,
    pub gateway: InMemoryGateway,
    pub orders: Arc<InMemoryOrderStore>,
    sweeper: JoinHandle<()>,
}

impl Platform {
    /// Stops the sweeper and drains the event bus.
    pub async fn shutdown(self) {
        self.sweeper.abort();
        self.bus.shutdown().await;
    }
}

/// Builds the platform from configuration and subscribes the saga
/// handlers to their topics.
pub async fn create_platform(config: &Config) -> Platform {
    let bus = Arc::new(InMemoryEventBus::with_config(BusConfig {
        queue_capacity: config.queue_capacity,
        retry: RetryPolicy {
            max_attempts: config.retry_max_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        },
    }));

    let inventory = Arc::new(InventoryLedger::with_config(LedgerConfig {
        reservation_ttl: chrono::Duration::from_std(config.reservation_ttl)
            .expect("reservation TTL out of range"),
    }));

    let gateway = InMemoryGateway::new();
    let payments = Arc::new(PaymentLedger::with_config(
        gateway.clone(),
        PaymentConfig {
            gateway_timeout: config.gateway_timeout,
        },
    ));

    let orders = Arc::new(InMemoryOrderStore::new());

    let orchestrator = Arc::new(OrderSagaOrchestrator::new(
        Arc::clone(&bus),
        Arc::clone(&inventory),
        orders.clone() as Arc<dyn OrderStore>,
        PricingPolicy {
            tax_rate_bps: config.tax_rate_bps,
            flat_shipping: Money::from_cents(config.shipping_flat_cents),
        },
        Currency::Usd,
    ));
    bus.subscribe(TOPIC_ORDERS, GROUP_ORCHESTRATOR, orchestrator)
        .await
        .expect("orchestrator subscription");

    let processor = Arc::new(PaymentProcessor::new(
        Arc::clone(&bus),
        Arc::clone(&payments),
    ));
    bus.subscribe(TOPIC_PAYMENTS, GROUP_PAYMENT_PROCESSOR, processor)
        .await
        .expect("payment processor subscription");

    let sweeper = spawn_sweeper(Arc::clone(&inventory), config.sweep_interval);

    Platform {
        bus,
        inventory,
        payments,
        gateway,
        orders,
        sweeper,
    }
}

/// Spawns the reservation-expiry sweeper loop.
///
/// Periodically releases reservations past their deadline, reclaiming
/// stock from abandoned checkouts without waiting on an explicit
/// cancellation event.
pub fn spawn_sweeper(
    inventory: Arc<InventoryLedger>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep before anything can have expired.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = inventory.sweep_expired().await;
            if swept > 0 {
                tracing::info!(swept, "released expired reservations");
            }
        }
    })
}

/// Creates the Axum application router for the runtime endpoints.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, OrderLine, ProductId, Sku};
    use saga::{OrderEvent, OrderStatus, PaymentState};
    use std::time::Duration;

    #[tokio::test]
    async fn test_platform_processes_an_order_end_to_end() {
        let config = Config {
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(10),
            ..Config::default()
        };
        let platform = create_platform(&config).await;

        platform
            .inventory
            .stock(Sku::new("SKU-001"), ProductId::new(), 5, 0)
            .await
            .unwrap();

        let order_id = OrderId::new();
        let event = OrderEvent::order_created(
            order_id,
            vec![OrderLine::new(
                ProductId::new(),
                "SKU-001",
                "Widget",
                1,
                Money::from_cents(1000),
            )],
        );
        platform
            .bus
            .publish(TOPIC_ORDERS, event.envelope().unwrap())
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(order) = platform.orders.get(order_id).await.unwrap()
                && order.status == OrderStatus::Confirmed
                && order.payment_state == PaymentState::Paid
            {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "order never confirmed"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(platform.gateway.charge_count(), 1);
        platform.shutdown().await;
    }
}
