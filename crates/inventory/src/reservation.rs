//! Stock reservation records and their state machine.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Sku};
use serde::{Deserialize, Serialize};

/// The state of a reservation in its lifecycle.
///
/// State transitions:
/// ```text
/// Active ──┬──► Committed   (payment succeeded, stock permanently deducted)
///          └──► Released    (cancelled, payment failed, or expired)
/// ```
///
/// Both Committed and Released are terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationStatus {
    /// A live claim on stock, counted in the SKU's `reserved` total.
    #[default]
    Active,

    /// Converted into a permanent stock deduction (terminal state).
    Committed,

    /// Returned to the available pool (terminal state).
    Released,
}

impl ReservationStatus {
    /// Returns true if the reservation can be committed.
    pub fn can_commit(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }

    /// Returns true if the reservation can be released.
    pub fn can_release(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Committed | ReservationStatus::Released)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "Active",
            ReservationStatus::Committed => "Committed",
            ReservationStatus::Released => "Released",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a reservation was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// The order was cancelled.
    OrderCancelled,

    /// Payment for the order failed.
    PaymentFailed,

    /// A sibling line item of the same order could not be reserved.
    StockRejected,

    /// The reservation passed its expiry deadline and was swept.
    Expired,

    /// Operator-initiated release.
    Manual,
}

impl ReleaseReason {
    /// Returns the reason as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::OrderCancelled => "order_cancelled",
            ReleaseReason::PaymentFailed => "payment_failed",
            ReleaseReason::StockRejected => "stock_rejected",
            ReleaseReason::Expired => "expired",
            ReleaseReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provisional claim on stock quantity tied to one order/SKU pair.
///
/// Uniqueness is composite on `(order_id, sku)`: a redelivered reserve
/// request for the same pair returns the existing reservation instead of
/// double-reserving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    /// Generated identity.
    pub id: ReservationId,

    /// The order holding the claim.
    pub order_id: OrderId,

    /// The SKU being claimed.
    pub sku: Sku,

    /// Number of units claimed.
    pub quantity: u32,

    /// Current lifecycle state.
    pub status: ReservationStatus,

    /// When the claim was made.
    pub created_at: DateTime<Utc>,

    /// Deadline after which the sweep reclaims the stock.
    pub expires_at: DateTime<Utc>,

    /// Why the reservation was released, once it has been.
    pub release_reason: Option<ReleaseReason>,
}

impl StockReservation {
    /// Creates a new active reservation.
    pub fn new(
        order_id: OrderId,
        sku: Sku,
        quantity: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            sku,
            quantity,
            status: ReservationStatus::Active,
            created_at,
            expires_at,
            release_reason: None,
        }
    }

    /// Returns true if the reservation is active and past its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at <= now
    }
}
