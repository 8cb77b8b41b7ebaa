// Records and request/response DTOs for the booking core

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::booking::pricing::PriceBreakdown;

use crate::booking::types::{
    CouponId, CustomerId, DiscountType, Lifecycle, MenuId, OptionId, PointTransactionKind,
    ReservationId, ReservationStatus, SalonId, StaffId,
};

/// Per-salon scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SalonSettings {
    pub salon_id: SalonId,
    /// Granularity of bookable start times (e.g. 10, 20 or 30 minutes)
    pub slot_interval_minutes: i32,
    /// Fixed offset of the salon's wall clock from UTC
    pub utc_offset_minutes: i32,
}

/// Weekly working-hours template for a staff member, or the salon default when `staff_id` is empty
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkingHoursRule {
    pub salon_id: SalonId,
    pub staff_id: Option<StaffId>,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: i16,
    pub is_open: bool,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

impl WorkingHoursRule {
    pub fn day_index(weekday: Weekday) -> i16 {
        weekday.num_days_from_monday() as i16
    }
}

/// Dated override of the weekly template (holiday or special hours)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleException {
    pub salon_id: SalonId,
    pub staff_id: Option<StaffId>,
    pub date: NaiveDate,
    pub is_closed: bool,
    pub opens_at: Option<NaiveTime>,
    pub closes_at: Option<NaiveTime>,
}

/// Staff member together with their booking configuration
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffMember {
    pub id: StaffId,
    pub salon_id: SalonId,
    pub display_name: String,
    /// Higher value is preferred by auto-assignment
    pub priority: i32,
    /// Premium charged when the customer names this staff member
    pub extra_charge: i64,
    pub archived_at: Option<DateTime<Utc>>,
}

impl StaffMember {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_archived_at(self.archived_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Menu {
    pub id: MenuId,
    pub salon_id: SalonId,
    pub name: String,
    pub unit_price: i64,
    pub sale_price: Option<i64>,
    pub duration_minutes: i32,
    pub excluded_staff_ids: Vec<StaffId>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Menu {
    /// Sale price if set, otherwise unit price
    pub fn effective_price(&self) -> i64 {
        self.sale_price.unwrap_or(self.unit_price)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_archived_at(self.archived_at)
    }
}

/// Add-on that can be booked (possibly several times) alongside a menu
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuOption {
    pub id: OptionId,
    pub salon_id: SalonId,
    pub name: String,
    pub unit_price: i64,
    pub sale_price: Option<i64>,
    pub duration_minutes: i32,
    pub excluded_staff_ids: Vec<StaffId>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl MenuOption {
    /// Sale price if set, otherwise unit price
    pub fn effective_price(&self) -> i64 {
        self.sale_price.unwrap_or(self.unit_price)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_archived_at(self.archived_at)
    }
}

/// Coupon together with its configuration (window, cap, exclusions)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: CouponId,
    pub salon_id: SalonId,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Unset means unlimited
    pub max_use_count: Option<i32>,
    pub use_count: i32,
    pub excluded_menu_ids: Vec<MenuId>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_archived_at(self.archived_at)
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now <= end)
    }

    pub fn has_uses_left(&self) -> bool {
        self.max_use_count.map_or(true, |max| self.use_count < max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: ReservationId,
    pub salon_id: SalonId,
    pub customer_id: CustomerId,
    pub staff_id: StaffId,
    pub menu_id: MenuId,
    pub option_ids: Vec<OptionId>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Salon-local date the window falls on
    pub local_date: NaiveDate,
    pub status: ReservationStatus,
    pub coupon_id: Option<CouponId>,
    pub subtotal: i64,
    pub staff_premium: i64,
    pub coupon_discount: i64,
    pub points_redeemed: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}

/// A claimed window, as seen by slot computation
#[derive(Debug, Clone, FromRow)]
pub struct BookedWindow {
    pub reservation_id: ReservationId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointBalance {
    pub customer_id: CustomerId,
    pub balance: i64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

/// Deferred instruction to credit points once `scheduled_for` has passed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointAccrualTask {
    pub id: Uuid,
    pub reservation_id: ReservationId,
    pub customer_id: CustomerId,
    pub points: i64,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One-time code confirming point usage in person
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointAuthCode {
    pub id: Uuid,
    pub reservation_id: ReservationId,
    pub customer_id: CustomerId,
    pub code: String,
    pub points: i64,
    pub expires_at: DateTime<Utc>,
}

impl PointAuthCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointTransaction {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub reservation_id: Option<ReservationId>,
    pub kind: PointTransactionKind,
    /// Signed change applied to the balance
    pub delta: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for listing bookable start times
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SlotQuery {
    pub salon_id: SalonId,
    /// Named staff member; auto-assignment when absent
    pub staff_id: Option<StaffId>,
    pub menu_id: MenuId,
    #[validate(length(max = 20, message = "At most 20 options can be booked"))]
    #[serde(default)]
    pub option_ids: Vec<OptionId>,
    pub date: NaiveDate,
}

/// Request DTO for creating (or quoting) a booking
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub salon_id: SalonId,
    pub customer_id: CustomerId,
    pub staff_id: Option<StaffId>,
    pub menu_id: MenuId,
    #[validate(length(max = 20, message = "At most 20 options can be booked"))]
    #[serde(default)]
    pub option_ids: Vec<OptionId>,
    pub date: NaiveDate,
    pub slot_start: NaiveTime,
    #[validate(range(min = 0, message = "Requested points cannot be negative"))]
    #[serde(default)]
    pub points_requested: i64,
    #[validate(custom = "crate::validation::validate_coupon_code")]
    pub coupon_code: Option<String>,
}

/// Request DTO for moving a booking to another start time
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RescheduleRequest {
    pub reservation_id: ReservationId,
    pub date: NaiveDate,
    pub slot_start: NaiveTime,
}

/// Request DTO for in-person redemption of an auth code
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedeemAuthCodeRequest {
    pub reservation_id: ReservationId,
    #[validate(custom = "crate::validation::validate_auth_code")]
    pub code: String,
}

/// Bookable start times for a query
#[derive(Debug, Clone, Serialize)]
pub struct AvailableSlots {
    pub date: NaiveDate,
    /// Set when the customer named a staff member
    pub staff_id: Option<StaffId>,
    pub required_minutes: i32,
    pub slots: Vec<NaiveTime>,
}

/// Outcome of a successful booking
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub reservation_id: ReservationId,
    pub staff_id: StaffId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub final_price: i64,
    pub points_applied: i64,
    pub coupon_discount: i64,
    /// Present when points were redeemed
    pub auth_code: Option<String>,
}

/// Price and placement of a booking that has not been made
#[derive(Debug, Clone, Serialize)]
pub struct BookingQuote {
    pub staff_id: StaffId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub required_minutes: i32,
    pub price: PriceBreakdown,
}

/// Outcome of one maintenance sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub expired_auth_codes: u64,
    pub purged_catalog_rows: u64,
}
