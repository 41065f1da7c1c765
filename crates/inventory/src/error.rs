//! Inventory error types.

use common::{ReservationId, Sku};
use thiserror::Error;

use crate::reservation::ReservationStatus;

/// Errors that can occur during inventory ledger operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock to satisfy a reservation.
    ///
    /// This is a business rejection, not a fault: the saga routes it
    /// through a StockRejected transition.
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: Sku,
        requested: u32,
        available: u32,
    },

    /// Attempted transition from a terminal or incompatible state.
    #[error("Invalid reservation state: cannot {action} reservation {reservation_id} in {status} state")]
    InvalidState {
        reservation_id: ReservationId,
        status: ReservationStatus,
        action: &'static str,
    },

    /// The SKU has never been stocked.
    #[error("Unknown SKU: {0}")]
    UnknownSku(Sku),

    /// No reservation exists with the given ID.
    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    /// A stock adjustment would leave fewer units than are reserved.
    #[error(
        "Invalid adjustment for {sku}: delta {delta} with total {total} would undercut reserved {reserved}"
    )]
    InvalidAdjustment {
        sku: Sku,
        delta: i64,
        total: u32,
        reserved: u32,
    },

    /// A reservation for zero units is meaningless.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
