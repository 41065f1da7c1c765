//! The inventory ledger: serialized per-SKU stock mutation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{OrderId, ProductId, ReservationId, Sku};
use tokio::sync::{Mutex, RwLock};

use crate::error::{InventoryError, Result};
use crate::item::InventoryItem;
use crate::reservation::{ReleaseReason, ReservationStatus, StockReservation};

/// Configuration for the inventory ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long a reservation holds stock before the sweep reclaims it.
    pub reservation_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::minutes(15),
        }
    }
}

/// Everything the ledger tracks for one SKU, guarded by one lock.
#[derive(Debug)]
struct SkuState {
    item: InventoryItem,
    reservations: HashMap<ReservationId, StockReservation>,
    /// Latest reservation per order, for `(order, sku)` idempotency.
    by_order: HashMap<OrderId, ReservationId>,
}

impl SkuState {
    fn new(item: InventoryItem) -> Self {
        Self {
            item,
            reservations: HashMap::new(),
            by_order: HashMap::new(),
        }
    }
}

/// The stock reservation engine.
///
/// Counters for a given SKU are only ever mutated while holding that
/// SKU's lock, so two concurrent `reserve` calls can never both succeed
/// when their combined quantity exceeds what is available. Different
/// SKUs use different locks and proceed in parallel.
pub struct InventoryLedger {
    config: LedgerConfig,
    skus: RwLock<HashMap<Sku, Arc<Mutex<SkuState>>>>,
    /// Maps reservation IDs back to the SKU whose lock guards them.
    index: RwLock<HashMap<ReservationId, Sku>>,
}

impl InventoryLedger {
    /// Creates an empty ledger with default configuration.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Creates an empty ledger with the given configuration.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            config,
            skus: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Stocks a SKU for the first time, or receives additional units.
    ///
    /// If the SKU already exists, `total` units are added to its counters
    /// and the threshold is left unchanged.
    #[tracing::instrument(skip(self), fields(sku = %sku))]
    pub async fn stock(
        &self,
        sku: Sku,
        product_id: ProductId,
        total: u32,
        low_stock_threshold: u32,
    ) -> Result<InventoryItem> {
        let handle = {
            let mut skus = self.skus.write().await;
            skus.entry(sku.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(SkuState::new(InventoryItem::new(
                        sku.clone(),
                        product_id,
                        0,
                        low_stock_threshold,
                    ))))
                })
                .clone()
        };

        let mut state = handle.lock().await;
        state.item.total += total;
        tracing::info!(total = state.item.total, "stock received");
        Ok(state.item.clone())
    }

    /// Reserves `quantity` units of a SKU for an order.
    ///
    /// Atomically checks availability and increments `reserved`. Fails
    /// with [`InventoryError::InsufficientStock`] without any change when
    /// not enough is available. Idempotent on `(order_id, sku)`: if an
    /// Active or Committed reservation already exists for the pair, it is
    /// returned unchanged, which makes event redelivery harmless.
    #[tracing::instrument(skip(self), fields(%order_id, %sku))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        sku: Sku,
        quantity: u32,
    ) -> Result<StockReservation> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let handle = self.sku_handle(&sku).await?;
        let reservation = {
            let mut state = handle.lock().await;

            if let Some(existing_id) = state.by_order.get(&order_id)
                && let Some(existing) = state.reservations.get(existing_id)
                && existing.status != ReservationStatus::Released
            {
                tracing::debug!(reservation_id = %existing.id, "returning existing reservation");
                return Ok(existing.clone());
            }

            let available = state.item.available();
            if quantity > available {
                metrics::counter!("inventory_reservations_rejected_total").increment(1);
                return Err(InventoryError::InsufficientStock {
                    sku,
                    requested: quantity,
                    available,
                });
            }

            let now = Utc::now();
            let reservation = StockReservation::new(
                order_id,
                sku.clone(),
                quantity,
                now,
                now + self.config.reservation_ttl,
            );
            state.item.reserved += quantity;
            state.by_order.insert(order_id, reservation.id);
            state
                .reservations
                .insert(reservation.id, reservation.clone());

            self.warn_if_low(&state.item);
            reservation
        };

        self.index
            .write()
            .await
            .insert(reservation.id, reservation.sku.clone());

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(reservation_id = %reservation.id, quantity, "stock reserved");
        Ok(reservation)
    }

    /// Converts an active reservation into a permanent stock deduction.
    ///
    /// Decrements `total` and `reserved` together. Fails with
    /// [`InventoryError::InvalidState`] unless the reservation is Active.
    #[tracing::instrument(skip(self), fields(%reservation_id))]
    pub async fn commit(&self, reservation_id: ReservationId) -> Result<StockReservation> {
        let handle = self.reservation_handle(reservation_id).await?;
        let mut state = handle.lock().await;

        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or(InventoryError::UnknownReservation(reservation_id))?;

        if !reservation.status.can_commit() {
            return Err(InventoryError::InvalidState {
                reservation_id,
                status: reservation.status,
                action: "commit",
            });
        }

        let quantity = reservation.quantity;
        state.item.total -= quantity;
        state.item.reserved -= quantity;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .expect("reservation present under sku lock");
        reservation.status = ReservationStatus::Committed;
        let committed = reservation.clone();

        self.warn_if_low(&state.item);
        metrics::counter!("inventory_commits_total").increment(1);
        tracing::info!(quantity, "reservation committed");
        Ok(committed)
    }

    /// Returns a reservation's quantity to the available pool.
    ///
    /// Valid from Active. Releasing an already-Released reservation is an
    /// idempotent no-op success, since the desired end state already
    /// holds; releasing a Committed one is [`InventoryError::InvalidState`].
    #[tracing::instrument(skip(self), fields(%reservation_id, %reason))]
    pub async fn release(
        &self,
        reservation_id: ReservationId,
        reason: ReleaseReason,
    ) -> Result<StockReservation> {
        let handle = self.reservation_handle(reservation_id).await?;
        let mut state = handle.lock().await;

        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or(InventoryError::UnknownReservation(reservation_id))?;

        match reservation.status {
            ReservationStatus::Released => return Ok(reservation.clone()),
            ReservationStatus::Committed => {
                return Err(InventoryError::InvalidState {
                    reservation_id,
                    status: reservation.status,
                    action: "release",
                });
            }
            ReservationStatus::Active => {}
        }

        let quantity = reservation.quantity;
        state.item.reserved -= quantity;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .expect("reservation present under sku lock");
        reservation.status = ReservationStatus::Released;
        reservation.release_reason = Some(reason);
        let released = reservation.clone();

        metrics::counter!("inventory_releases_total").increment(1);
        tracing::info!(quantity, "reservation released");
        Ok(released)
    }

    /// Administrative change to a SKU's `total` (shipments, corrections).
    ///
    /// Never touches active reservations; rejects a delta that would
    /// leave fewer units on hand than are currently reserved.
    #[tracing::instrument(skip(self), fields(%sku, delta))]
    pub async fn adjust_stock(&self, sku: Sku, delta: i64, reason: &str) -> Result<InventoryItem> {
        let handle = self.sku_handle(&sku).await?;
        let mut state = handle.lock().await;

        let new_total = state.item.total as i64 + delta;
        if new_total < state.item.reserved as i64 || new_total > u32::MAX as i64 {
            return Err(InventoryError::InvalidAdjustment {
                sku,
                delta,
                total: state.item.total,
                reserved: state.item.reserved,
            });
        }

        state.item.total = new_total as u32;
        metrics::counter!("inventory_adjustments_total").increment(1);
        tracing::info!(total = state.item.total, reason, "stock adjusted");
        Ok(state.item.clone())
    }

    /// Releases every active reservation past its deadline.
    ///
    /// This is the timeout mechanism that reclaims stock from abandoned
    /// checkouts without waiting for an explicit cancellation event.
    /// Returns the number of reservations released.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let handles: Vec<Arc<Mutex<SkuState>>> =
            self.skus.read().await.values().cloned().collect();

        let mut swept = 0;
        for handle in handles {
            let mut state = handle.lock().await;
            let expired: Vec<ReservationId> = state
                .reservations
                .values()
                .filter(|r| r.is_expired(now))
                .map(|r| r.id)
                .collect();

            for id in expired {
                let quantity = state.reservations[&id].quantity;
                state.item.reserved -= quantity;
                let reservation = state
                    .reservations
                    .get_mut(&id)
                    .expect("reservation present under sku lock");
                reservation.status = ReservationStatus::Released;
                reservation.release_reason = Some(ReleaseReason::Expired);
                swept += 1;
                tracing::info!(reservation_id = %id, quantity, "expired reservation swept");
            }
        }

        if swept > 0 {
            metrics::counter!("inventory_expired_swept_total").increment(swept as u64);
        }
        swept
    }

    /// Returns a snapshot of a SKU's counters.
    pub async fn item(&self, sku: &Sku) -> Option<InventoryItem> {
        let handle = self.skus.read().await.get(sku).cloned()?;
        let state = handle.lock().await;
        Some(state.item.clone())
    }

    /// Returns a snapshot of a reservation.
    pub async fn reservation(&self, reservation_id: ReservationId) -> Option<StockReservation> {
        let handle = self.reservation_handle(reservation_id).await.ok()?;
        let state = handle.lock().await;
        state.reservations.get(&reservation_id).cloned()
    }

    /// Returns snapshots of every reservation made for an order.
    pub async fn reservations_for_order(&self, order_id: OrderId) -> Vec<StockReservation> {
        let handles: Vec<Arc<Mutex<SkuState>>> =
            self.skus.read().await.values().cloned().collect();

        let mut reservations = Vec::new();
        for handle in handles {
            let state = handle.lock().await;
            reservations.extend(
                state
                    .reservations
                    .values()
                    .filter(|r| r.order_id == order_id)
                    .cloned(),
            );
        }
        reservations
    }

    async fn sku_handle(&self, sku: &Sku) -> Result<Arc<Mutex<SkuState>>> {
        self.skus
            .read()
            .await
            .get(sku)
            .cloned()
            .ok_or_else(|| InventoryError::UnknownSku(sku.clone()))
    }

    async fn reservation_handle(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Arc<Mutex<SkuState>>> {
        let sku = self
            .index
            .read()
            .await
            .get(&reservation_id)
            .cloned()
            .ok_or(InventoryError::UnknownReservation(reservation_id))?;
        self.sku_handle(&sku).await
    }

    fn warn_if_low(&self, item: &InventoryItem) {
        if item.is_low_stock() {
            metrics::counter!("inventory_low_stock_total").increment(1);
            tracing::warn!(
                sku = %item.sku,
                available = item.available(),
                threshold = item.low_stock_threshold,
                "SKU is low on stock"
            );
        }
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stocked_ledger(sku: &str, total: u32) -> InventoryLedger {
        let ledger = InventoryLedger::new();
        ledger
            .stock(Sku::new(sku), ProductId::new(), total, 0)
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_reserve_decrements_available() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let order_id = OrderId::new();

        let reservation = ledger
            .reserve(order_id, Sku::new("SKU-001"), 4)
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Active);
        assert_eq!(reservation.quantity, 4);

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 10);
        assert_eq!(item.reserved, 4);
        assert_eq!(item.available(), 6);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_stock_makes_no_change() {
        let ledger = stocked_ledger("SKU-001", 3).await;

        let result = ledger.reserve(OrderId::new(), Sku::new("SKU-001"), 5).await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                requested: 5,
                available: 3,
                ..
            })
        ));

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, 0);
    }

    #[tokio::test]
    async fn test_reserve_unknown_sku() {
        let ledger = InventoryLedger::new();
        let result = ledger.reserve(OrderId::new(), Sku::new("NOPE"), 1).await;
        assert!(matches!(result, Err(InventoryError::UnknownSku(_))));
    }

    #[tokio::test]
    async fn test_reserve_zero_quantity_rejected() {
        let ledger = stocked_ledger("SKU-001", 3).await;
        let result = ledger.reserve(OrderId::new(), Sku::new("SKU-001"), 0).await;
        assert!(matches!(result, Err(InventoryError::InvalidQuantity(0))));
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent_per_order_and_sku() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let order_id = OrderId::new();

        let first = ledger
            .reserve(order_id, Sku::new("SKU-001"), 4)
            .await
            .unwrap();
        let second = ledger
            .reserve(order_id, Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, 4);
        assert_eq!(item.available(), 6);
    }

    #[tokio::test]
    async fn test_redelivered_reserve_after_commit_returns_committed() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let order_id = OrderId::new();

        let reservation = ledger
            .reserve(order_id, Sku::new("SKU-001"), 4)
            .await
            .unwrap();
        ledger.commit(reservation.id).await.unwrap();

        let redelivered = ledger
            .reserve(order_id, Sku::new("SKU-001"), 4)
            .await
            .unwrap();
        assert_eq!(redelivered.id, reservation.id);
        assert_eq!(redelivered.status, ReservationStatus::Committed);

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 6);
        assert_eq!(item.reserved, 0);
    }

    #[tokio::test]
    async fn test_commit_deducts_total_and_reserved_together() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        let committed = ledger.commit(reservation.id).await.unwrap();
        assert_eq!(committed.status, ReservationStatus::Committed);

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.total, 6);
        assert_eq!(item.reserved, 0);
        assert_eq!(item.available(), 6);
    }

    #[tokio::test]
    async fn test_commit_from_terminal_state_fails() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        ledger
            .release(reservation.id, ReleaseReason::Manual)
            .await
            .unwrap();

        let result = ledger.commit(reservation.id).await;
        assert!(matches!(
            result,
            Err(InventoryError::InvalidState {
                status: ReservationStatus::Released,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_release_restores_available_exactly() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let before = ledger.item(&Sku::new("SKU-001")).await.unwrap().available();

        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 7)
            .await
            .unwrap();
        ledger
            .release(reservation.id, ReleaseReason::OrderCancelled)
            .await
            .unwrap();

        let after = ledger.item(&Sku::new("SKU-001")).await.unwrap().available();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        let first = ledger
            .release(reservation.id, ReleaseReason::PaymentFailed)
            .await
            .unwrap();
        let second = ledger
            .release(reservation.id, ReleaseReason::PaymentFailed)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.release_reason, Some(ReleaseReason::PaymentFailed));

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, 0);
    }

    #[tokio::test]
    async fn test_release_committed_fails() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();
        ledger.commit(reservation.id).await.unwrap();

        let result = ledger
            .release(reservation.id, ReleaseReason::Manual)
            .await;
        assert!(matches!(
            result,
            Err(InventoryError::InvalidState {
                status: ReservationStatus::Committed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_adjust_stock_never_undercuts_reservations() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 6)
            .await
            .unwrap();

        let item = ledger
            .adjust_stock(Sku::new("SKU-001"), -4, "shrinkage")
            .await
            .unwrap();
        assert_eq!(item.total, 6);
        assert_eq!(item.reserved, 6);

        let result = ledger
            .adjust_stock(Sku::new("SKU-001"), -1, "shrinkage")
            .await;
        assert!(matches!(result, Err(InventoryError::InvalidAdjustment { .. })));
    }

    #[tokio::test]
    async fn test_adjust_stock_receives_shipment() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let item = ledger
            .adjust_stock(Sku::new("SKU-001"), 25, "shipment")
            .await
            .unwrap();
        assert_eq!(item.total, 35);
    }

    #[tokio::test]
    async fn test_sweep_releases_expired_reservations() {
        let ledger = InventoryLedger::with_config(LedgerConfig {
            reservation_ttl: Duration::zero(),
        });
        ledger
            .stock(Sku::new("SKU-001"), ProductId::new(), 10, 0)
            .await
            .unwrap();

        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        let swept = ledger.sweep_expired().await;
        assert_eq!(swept, 1);

        let reservation = ledger.reservation(reservation.id).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Released);
        assert_eq!(reservation.release_reason, Some(ReleaseReason::Expired));

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.available(), 10);

        // Nothing left to sweep.
        assert_eq!(ledger.sweep_expired().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_leaves_unexpired_reservations_alone() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        let reservation = ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 4)
            .await
            .unwrap();

        assert_eq!(ledger.sweep_expired().await, 0);
        let reservation = ledger.reservation(reservation.id).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn test_scenario_exhaust_then_release() {
        // SKU with total=5: reserve 5 succeeds, reserve 1 more fails,
        // releasing the first restores available to 5.
        let ledger = stocked_ledger("SKU-X", 5).await;
        let first_order = OrderId::new();

        let reservation = ledger
            .reserve(first_order, Sku::new("SKU-X"), 5)
            .await
            .unwrap();

        let result = ledger.reserve(OrderId::new(), Sku::new("SKU-X"), 1).await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock { available: 0, .. })
        ));

        ledger
            .release(reservation.id, ReleaseReason::OrderCancelled)
            .await
            .unwrap();

        let item = ledger.item(&Sku::new("SKU-X")).await.unwrap();
        assert_eq!(item.available(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_never_oversell() {
        let ledger = Arc::new(stocked_ledger("SKU-001", 10).await);

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                ledger.reserve(OrderId::new(), Sku::new("SKU-001"), 1).await
            }));
        }

        let mut granted = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => granted += 1,
                Err(InventoryError::InsufficientStock { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(granted, 10);
        assert_eq!(rejected, 40);

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, 10);
        assert_eq!(item.available(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_quantities_respect_total() {
        let ledger = Arc::new(stocked_ledger("SKU-001", 20).await);

        let mut tasks = Vec::new();
        for i in 0..30u32 {
            let ledger = Arc::clone(&ledger);
            let quantity = i % 3 + 1;
            tasks.push(tokio::spawn(async move {
                ledger
                    .reserve(OrderId::new(), Sku::new("SKU-001"), quantity)
                    .await
            }));
        }

        let mut reserved_sum = 0u32;
        for task in tasks {
            if let Ok(reservation) = task.await.unwrap() {
                reserved_sum += reservation.quantity;
            }
        }

        let item = ledger.item(&Sku::new("SKU-001")).await.unwrap();
        assert_eq!(item.reserved, reserved_sum);
        assert!(item.reserved <= item.total);
    }

    #[tokio::test]
    async fn test_reservations_for_order_spans_skus() {
        let ledger = stocked_ledger("SKU-001", 10).await;
        ledger
            .stock(Sku::new("SKU-002"), ProductId::new(), 5, 0)
            .await
            .unwrap();

        let order_id = OrderId::new();
        ledger
            .reserve(order_id, Sku::new("SKU-001"), 2)
            .await
            .unwrap();
        ledger
            .reserve(order_id, Sku::new("SKU-002"), 1)
            .await
            .unwrap();
        ledger
            .reserve(OrderId::new(), Sku::new("SKU-001"), 3)
            .await
            .unwrap();

        let reservations = ledger.reservations_for_order(order_id).await;
        assert_eq!(reservations.len(), 2);
    }
}
