// Collaborator interfaces for the booking core
//
// The engines only see these traits. Two adapters ship with the crate:
// an in-memory store used by tests and embedders, and a Postgres store.
// Each method on ReservationRepository and the mutating PointStore methods
// is one atomic unit of work.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::error::BookingResult;
use crate::booking::models::{
    BookedWindow, Coupon, Menu, MenuOption, PointAccrualTask, PointAuthCode, PointTransaction,
    Reservation, SalonSettings, ScheduleException, StaffMember, WorkingHoursRule,
};
use crate::booking::types::{
    CustomerId, MenuId, OptionId, ReservationId, ReservationStatus, SalonId, StaffId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Working-hours template, exceptions and booked intervals
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn salon_settings(&self, salon_id: SalonId) -> BookingResult<Option<SalonSettings>>;

    /// Salon-default and staff-specific rules for one weekday
    async fn working_hours(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        day_of_week: i16,
    ) -> BookingResult<Vec<WorkingHoursRule>>;

    /// Salon-wide and staff-specific exceptions for one date
    async fn schedule_exceptions(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<ScheduleException>>;

    /// Windows of reservations that still hold their slot on a salon-local date
    async fn booked_windows(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<BookedWindow>>;
}

/// Staff, menus, options and coupons, including archived rows
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn staff_member(&self, staff_id: StaffId) -> BookingResult<Option<StaffMember>>;

    async fn salon_staff(&self, salon_id: SalonId) -> BookingResult<Vec<StaffMember>>;

    async fn menu(&self, menu_id: MenuId) -> BookingResult<Option<Menu>>;

    /// Distinct options for the given ids; missing ids are simply absent from the result
    async fn menu_options(&self, option_ids: &[OptionId]) -> BookingResult<Vec<MenuOption>>;

    async fn coupon_by_code(&self, salon_id: SalonId, code: &str)
        -> BookingResult<Option<Coupon>>;

    /// Hard-delete rows archived at or before `cutoff`
    async fn purge_archived(&self, cutoff: DateTime<Utc>) -> BookingResult<u64>;
}

/// Everything that must land together when a booking is confirmed
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub reservation: Reservation,
    pub auth_code: Option<PointAuthCode>,
    pub accrual: PointAccrualTask,
}

/// Target of a reschedule, with the point artifacts that move with it
#[derive(Debug, Clone)]
pub struct RescheduledWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub auth_code_expires_at: DateTime<Utc>,
    pub accrual_scheduled_for: DateTime<Utc>,
}

/// What a release (cancel/refund) undid
#[derive(Debug, Clone)]
pub struct ReleasedBooking {
    pub reservation: Reservation,
    pub points_credited: i64,
    pub auth_code_deleted: bool,
    pub accrual_deleted: bool,
}

/// What applying one accrual task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Points credited and the task deleted
    Credited,
    /// The reservation is not completed yet; the task stays queued
    Deferred,
    /// The reservation ended without service; the task was deleted uncredited
    Dropped,
    /// The task no longer exists
    Missing,
}

/// Reservation unit of work
///
/// Every method re-validates its preconditions inside the same atomic unit
/// that writes, so two racing callers cannot both succeed.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn reservation(&self, id: ReservationId) -> BookingResult<Option<Reservation>>;

    /// Insert the reservation, debit redeemed points, count the coupon use,
    /// store the auth code and queue the accrual task.
    ///
    /// Fails with `Conflict` if the window overlaps another held window for
    /// the same staff, `InvalidArgument` if the balance no longer covers the
    /// redemption, and `Coupon(Exhausted)` if the cap was reached meanwhile.
    async fn commit_booking(&self, booking: NewBooking) -> BookingResult<Reservation>;

    /// Move the reservation to `status`, deleting its auth code and queued
    /// accrual task and crediting back any debited points.
    ///
    /// Fails with `Conflict` if the stored status is no longer `expected`.
    async fn release_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<ReleasedBooking>;

    /// Mark the reservation completed and drop any unredeemed auth code
    async fn complete_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation>;

    /// Move the window, re-checking overlap against everything but itself
    async fn reschedule_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        window: RescheduledWindow,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation>;
}

/// Customer point balances and the point artifacts tied to reservations
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Current redeemable balance; zero when the customer has no ledger yet
    async fn point_balance(&self, customer_id: CustomerId) -> BookingResult<i64>;

    async fn auth_code_for(&self, reservation_id: ReservationId)
        -> BookingResult<Option<PointAuthCode>>;

    /// Delete the code; `false` when it was already gone
    async fn consume_auth_code(&self, auth_code_id: Uuid) -> BookingResult<bool>;

    async fn accrual_task_for(
        &self,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<PointAccrualTask>>;

    async fn due_accrual_tasks(&self, now: DateTime<Utc>) -> BookingResult<Vec<PointAccrualTask>>;

    /// Credit the task's points, record the transaction and delete the task,
    /// but only once its reservation is completed. A task whose reservation
    /// is still pending or confirmed is left queued; any other status drops it.
    async fn apply_accrual(&self, task_id: Uuid, now: DateTime<Utc>)
        -> BookingResult<AccrualOutcome>;

    async fn purge_expired_auth_codes(&self, now: DateTime<Utc>) -> BookingResult<u64>;

    async fn point_transactions(&self, customer_id: CustomerId)
        -> BookingResult<Vec<PointTransaction>>;
}

/// Convenience bound for adapters that implement every collaborator
pub trait BookingStore:
    AvailabilityStore + CatalogRepository + ReservationRepository + PointStore
{
}

impl<T> BookingStore for T where
    T: AvailabilityStore + CatalogRepository + ReservationRepository + PointStore
{
}

