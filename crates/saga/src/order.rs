//! The order record.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderLine};
use serde::{Deserialize, Serialize};

use crate::status::{OrderStatus, PaymentState};

/// Tax and shipping parameters used to compute order totals.
///
/// Deployment configuration, not a structural decision.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    /// Tax rate in basis points (10_000 = 100%).
    pub tax_rate_bps: u32,

    /// Flat shipping charge per order.
    pub flat_shipping: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 0,
            flat_shipping: Money::zero(),
        }
    }
}

/// An order as the saga sees it: line items plus two status axes.
///
/// Orders are never deleted; the store keeps an append-only history of
/// status changes alongside the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// Human-readable unique order number.
    pub order_number: String,

    /// Line items being purchased.
    pub lines: Vec<OrderLine>,

    /// Workflow state, driven only by the orchestrator.
    pub status: OrderStatus,

    /// Payment state, driven only by the orchestrator.
    pub payment_state: PaymentState,

    /// Sum of line totals.
    pub subtotal: Money,

    /// Tax computed at creation.
    pub tax: Money,

    /// Shipping charged at creation.
    pub shipping: Money,

    /// When the order was submitted.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order, computing totals from the lines.
    pub fn new(id: OrderId, lines: Vec<OrderLine>, pricing: &PricingPolicy) -> Self {
        let subtotal = lines
            .iter()
            .fold(Money::zero(), |acc, line| acc + line.line_total());
        let tax = subtotal.rate_bps(pricing.tax_rate_bps);

        Self {
            id,
            order_number: Self::order_number_for(id),
            lines,
            status: OrderStatus::Pending,
            payment_state: PaymentState::Pending,
            subtotal,
            tax,
            shipping: pricing.flat_shipping,
            created_at: Utc::now(),
        }
    }

    /// Grand total: subtotal + tax + shipping.
    pub fn total(&self) -> Money {
        self.subtotal + self.tax + self.shipping
    }

    /// Returns true if the order has line items.
    pub fn has_lines(&self) -> bool {
        !self.lines.is_empty()
    }

    fn order_number_for(id: OrderId) -> String {
        let simple = id.as_uuid().simple().to_string();
        format!("ORD-{}", simple[..8].to_ascii_uppercase())
    }
}
