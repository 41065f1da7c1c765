//! Inventory ledger for the commerce core.
//!
//! Owns per-SKU stock counters and reservations. Every mutation of a
//! SKU's counters goes through the ledger's reserve/commit/release/adjust
//! operations, which are serialized per SKU; operations on different SKUs
//! proceed fully in parallel.
//!
//! A reservation is a provisional claim on stock tied to one
//! `(order, sku)` pair. Committing converts it into a permanent deduction
//! (payment succeeded); releasing returns the quantity to the available
//! pool (cancellation, payment failure, or expiry via the sweep).

pub mod error;
pub mod item;
pub mod ledger;
pub mod reservation;

pub use error::{InventoryError, Result};
pub use item::InventoryItem;
pub use ledger::{InventoryLedger, LedgerConfig};
pub use reservation::{ReleaseReason, ReservationStatus, StockReservation};
