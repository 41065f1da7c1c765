//! Order store: repository operations over immutable order snapshots.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};
use crate::order::Order;
use crate::status::{OrderStatus, PaymentState};

/// One entry in an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Workflow state after the change.
    pub status: OrderStatus,

    /// Payment state after the change.
    pub payment_state: PaymentState,

    /// Why the change happened.
    pub reason: String,

    /// When the change happened.
    pub changed_at: DateTime<Utc>,
}

/// Durable storage for orders.
///
/// All reads return immutable snapshots; all mutation goes through
/// `set_status`, which appends to the order's audit history. Orders are
/// never deleted.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order.
    ///
    /// Idempotent: if the order already exists the stored snapshot is
    /// returned unchanged, which makes event redelivery harmless.
    async fn create(&self, order: Order) -> Result<Order>;

    /// Returns a snapshot of an order.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Moves an order to a new status pair, appending to its history.
    async fn set_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        payment_state: PaymentState,
        reason: &str,
    ) -> Result<Order>;

    /// Returns the order's status-change history, oldest first.
    async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>>;
}

#[derive(Debug, Clone)]
struct StoredOrder {
    order: Order,
    history: Vec<StatusChange>,
}

/// In-memory order store.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, StoredOrder>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<Order> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.get(&order.id) {
            return Ok(existing.order.clone());
        }

        let history = vec![StatusChange {
            status: order.status,
            payment_state: order.payment_state,
            reason: "order submitted".to_string(),
            changed_at: Utc::now(),
        }];
        orders.insert(order.id, StoredOrder {
            order: order.clone(),
            history,
        });
        Ok(order)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .get(&order_id)
            .map(|stored| stored.order.clone()))
    }

    async fn set_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        payment_state: PaymentState,
        reason: &str,
    ) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order_id)
            .ok_or(SagaError::OrderNotFound(order_id))?;

        // A terminal order never moves back; only its payment axis may
        // still change (refund completion).
        if stored.order.status.is_terminal() && status != stored.order.status {
            return Err(SagaError::InvalidTransition {
                order_id,
                status: stored.order.status,
                payment_state: stored.order.payment_state,
                action: "reopen",
            });
        }

        stored.order.status = status;
        stored.order.payment_state = payment_state;
        stored.history.push(StatusChange {
            status,
            payment_state,
            reason: reason.to_string(),
            changed_at: Utc::now(),
        });
        Ok(stored.order.clone())
    }

    async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        Ok(self
            .orders
            .read()
            .await
            .get(&order_id)
            .map(|stored| stored.history.clone())
            .unwrap_or_default())
    }
}
