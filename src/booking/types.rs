// Domain type definitions for the booking core
// Provides identifiers and small enums shared across the engines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type SalonId = i64;
pub type StaffId = i64;
pub type MenuId = i64;
pub type OptionId = i64;
pub type CustomerId = i64;
pub type CouponId = i64;
pub type ReservationId = Uuid;

/// Lifecycle status of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Refunded,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Refunded => "refunded",
        }
    }

    /// Whether a reservation in this status still claims its staff/time window
    pub fn holds_window(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::Completed
        )
    }
}

impl Default for ReservationStatus {
    fn default() -> Self {
        ReservationStatus::Pending
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "completed" => Ok(ReservationStatus::Completed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "refunded" => Ok(ReservationStatus::Refunded),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

/// How a coupon's discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Whole currency units taken off the payable amount
    Fixed,

    /// Integer percentage of the payable amount, floored
    Percentage,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Fixed => write!(f, "fixed"),
            DiscountType::Percentage => write!(f, "percentage"),
        }
    }
}

/// Kind of movement recorded in the point ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PointTransactionKind {
    /// Points debited when a booking that redeems points is confirmed
    Redeem,

    /// Debited points credited back on cancellation or refund
    Refund,

    /// Deferred accrual credited by the sweep
    Accrual,
}

impl fmt::Display for PointTransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointTransactionKind::Redeem => write!(f, "redeem"),
            PointTransactionKind::Refund => write!(f, "refund"),
            PointTransactionKind::Accrual => write!(f, "accrual"),
        }
    }
}

/// Soft-delete lifecycle of catalog records
///
/// Rows carry a nullable `archived_at`; a purged row no longer exists at all.
/// Anything other than `Active` is treated by the booking core as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Archived { at: DateTime<Utc> },
    Purged,
}

impl Lifecycle {
    pub fn from_archived_at(archived_at: Option<DateTime<Utc>>) -> Self {
        match archived_at {
            Some(at) => Lifecycle::Archived { at },
            None => Lifecycle::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    /// Whether an archived record has outlived the retention cutoff
    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        match self {
            Lifecycle::Archived { at } => *at <= cutoff,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_reservation_status_display() {
        assert_eq!(ReservationStatus::Pending.to_string(), "pending");
        assert_eq!(ReservationStatus::Confirmed.to_string(), "confirmed");
        assert_eq!(ReservationStatus::Refunded.to_string(), "refunded");
    }

    #[test]
    fn test_reservation_status_from_str() {
        assert_eq!(
            ReservationStatus::from_str("Cancelled").unwrap(),
            ReservationStatus::Cancelled
        );
        assert!(ReservationStatus::from_str("archived").is_err());
    }

    #[test]
    fn test_holds_window() {
        assert!(ReservationStatus::Confirmed.holds_window());
        assert!(ReservationStatus::Completed.holds_window());
        assert!(!ReservationStatus::Cancelled.holds_window());
        assert!(!ReservationStatus::Refunded.holds_window());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&DiscountType::Percentage).unwrap();
        assert_eq!(json, "\"percentage\"");

        let kind: PointTransactionKind = serde_json::from_str("\"accrual\"").unwrap();
        assert_eq!(kind, PointTransactionKind::Accrual);
    }

    #[test]
    fn test_lifecycle_from_archived_at() {
        assert_eq!(Lifecycle::from_archived_at(None), Lifecycle::Active);

        let at = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let lifecycle = Lifecycle::from_archived_at(Some(at));
        assert!(!lifecycle.is_active());
        assert!(lifecycle.is_purgeable(at));
        assert!(!lifecycle.is_purgeable(Utc.with_ymd_and_hms(2026, 1, 9, 0, 0, 0).unwrap()));
        assert!(!Lifecycle::Active.is_purgeable(at));
    }
}
