use crate::booking::error::{BookingError, BookingResult};
use crate::booking::types::ReservationStatus;

/// Service for managing reservation status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed, Cancelled
    /// - Confirmed → Completed, Cancelled
    /// - Completed → Refunded
    /// - Cancelled, Refunded → (terminal)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: ReservationStatus, to: ReservationStatus) -> bool {
        if from == to {
            return true;
        }

        matches!(
            (from, to),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Completed)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
                | (ReservationStatus::Completed, ReservationStatus::Refunded)
        )
    }

    /// Attempt to transition from one status to another
    pub fn transition(
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> BookingResult<ReservationStatus> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(BookingError::InvalidTransition { from, to })
        }
    }

    /// Like `transition`, but a same-status move is rejected too.
    ///
    /// Used by operations whose side effects (point credits, deletions) must
    /// not run twice.
    pub fn transition_once(
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> BookingResult<ReservationStatus> {
        if from == to {
            return Err(BookingError::InvalidTransition { from, to });
        }
        Self::transition(from, to)
    }

    pub fn is_terminal(status: ReservationStatus) -> bool {
        matches!(
            status,
            ReservationStatus::Cancelled | ReservationStatus::Refunded
        )
    }
}
