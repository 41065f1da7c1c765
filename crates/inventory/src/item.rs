//! Per-SKU stock counters.

use common::{ProductId, Sku};
use serde::{Deserialize, Serialize};

/// Stock counters for one SKU.
///
/// `available` is never stored; it is always derived from `total` and
/// `reserved`, which the ledger mutates together under the per-SKU lock.
/// Invariant: `0 <= reserved <= total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// The SKU these counters belong to.
    pub sku: Sku,

    /// The catalog product the SKU is a variant of.
    pub product_id: ProductId,

    /// Physical units on hand.
    pub total: u32,

    /// Sum of active reservation quantities.
    pub reserved: u32,

    /// Threshold at or below which the SKU is considered low on stock.
    pub low_stock_threshold: u32,
}

impl InventoryItem {
    /// Creates counters for a freshly stocked SKU.
    pub fn new(sku: Sku, product_id: ProductId, total: u32, low_stock_threshold: u32) -> Self {
        Self {
            sku,
            product_id,
            total,
            reserved: 0,
            low_stock_threshold,
        }
    }

    /// Units available for new reservations (`total - reserved`).
    pub fn available(&self) -> u32 {
        self.total - self.reserved
    }

    /// Returns true if available stock is at or below the low-stock threshold.
    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.low_stock_threshold
    }
}
