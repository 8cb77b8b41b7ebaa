// Error types for the booking core
// Every failure surfaced by the engines and the coordinator is one of these kinds

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::booking::types::{MenuId, ReservationStatus};

/// SQLSTATE raised by Postgres when an exclusion constraint rejects a row
const EXCLUSION_VIOLATION: &str = "23P01";

/// Reason a typed coupon could not be applied
///
/// Kept separate from [`BookingError`] so pricing can report the reason to the
/// caller while continuing without the coupon.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("Coupon '{code}' does not exist")]
    NotFound { code: String },

    #[error("Coupon '{code}' is outside its validity window")]
    Expired { code: String },

    #[error("Coupon '{code}' has reached its usage limit of {max_use_count}")]
    Exhausted { code: String, max_use_count: i32 },

    #[error("Coupon '{code}' does not apply to menu '{menu_name}'")]
    ExcludedForMenu {
        code: String,
        menu_id: MenuId,
        menu_name: String,
    },
}

impl CouponRejection {
    pub fn error_code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound { .. } => "COUPON_NOT_FOUND",
            CouponRejection::Expired { .. } => "COUPON_EXPIRED",
            CouponRejection::Exhausted { .. } => "COUPON_EXHAUSTED",
            CouponRejection::ExcludedForMenu { .. } => "COUPON_EXCLUDED_FOR_MENU",
        }
    }
}

/// Main error type for the booking core
#[derive(Debug, Error)]
pub enum BookingError {
    /// Staff, menu, option, salon, coupon owner or reservation is absent or archived
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// Lost a race for the same staff/time window, or the record changed underneath us
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request DTO failed `validator` checks
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    #[error("No availability: {reason}")]
    NoAvailability { reason: String },

    #[error("Authorization code expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Authorization code does not match this reservation")]
    InvalidCode,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Notification failed: {0}")]
    Notification(String),
}

/// Result type alias for booking operations
pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BookingError::Conflict {
            message: message.into(),
        }
    }

    pub fn no_availability(reason: impl Into<String>) -> Self {
        BookingError::NoAvailability {
            reason: reason.into(),
        }
    }

    /// Machine-readable code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            BookingError::NotFound { .. } => "NOT_FOUND",
            BookingError::Conflict { .. } => "CONFLICT",
            BookingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::Coupon(rejection) => rejection.error_code(),
            BookingError::NoAvailability { .. } => "NO_AVAILABILITY",
            BookingError::Expired { .. } => "EXPIRED",
            BookingError::InvalidCode => "INVALID_CODE",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::Database(_) => "DATABASE_ERROR",
            BookingError::Notification(_) => "NOTIFICATION_ERROR",
        }
    }

    /// Errors the caller can act on by re-querying or changing the request
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            BookingError::Database(_) | BookingError::Notification(_)
        )
    }

    /// Build the client-facing response body
    ///
    /// Store failures are logged in full and replaced by a generic message.
    pub fn to_error_response(&self) -> ErrorResponse {
        let message = match self {
            BookingError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            other => other.to_string(),
        };

        let details = match self {
            BookingError::Coupon(rejection) => serde_json::to_value(rejection).ok(),
            _ => None,
        };

        ErrorResponse {
            error_code: self.error_code().to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_error) = error {
            if db_error.code().as_deref() == Some(EXCLUSION_VIOLATION) {
                return BookingError::conflict(
                    "staff member already has a reservation in this window",
                );
            }
        }
        BookingError::Database(error)
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BookingError::Validation(errors.to_string())
    }
}

/// Consistent error body handed to whatever transport fronts the core
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "COUPON_EXPIRED", "CONFLICT")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp of when the error was rendered
    pub timestamp: String,
}
