// In-memory store
//
// Holds every table behind one async mutex, so each trait method is
// trivially serializable. Used by the test-suite and by embedders that
// keep their own persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::booking::error::{BookingError, BookingResult, CouponRejection};
use crate::booking::models::{
    BookedWindow, Coupon, Menu, MenuOption, PointAccrualTask, PointAuthCode, PointBalance,
    PointTransaction, Reservation, SalonSettings, ScheduleException, StaffMember,
    WorkingHoursRule,
};
use crate::booking::store::{
    AccrualOutcome, AvailabilityStore, CatalogRepository, NewBooking, PointStore, ReleasedBooking,
    RescheduledWindow, ReservationRepository,
};
use crate::booking::types::{
    CouponId, CustomerId, MenuId, OptionId, PointTransactionKind, ReservationId,
    ReservationStatus, SalonId, StaffId,
};

#[derive(Debug, Default)]
struct State {
    salons: HashMap<SalonId, SalonSettings>,
    working_hours: Vec<WorkingHoursRule>,
    exceptions: Vec<ScheduleException>,
    staff: HashMap<StaffId, StaffMember>,
    menus: HashMap<MenuId, Menu>,
    options: HashMap<OptionId, MenuOption>,
    coupons: HashMap<CouponId, Coupon>,
    reservations: HashMap<ReservationId, Reservation>,
    balances: HashMap<CustomerId, PointBalance>,
    transactions: Vec<PointTransaction>,
    /// Keyed by reservation: at most one outstanding code per reservation
    auth_codes: HashMap<ReservationId, PointAuthCode>,
    accruals: HashMap<Uuid, PointAccrualTask>,
}

impl State {
    fn has_overlap(
        &self,
        staff_id: StaffId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        ignore: Option<ReservationId>,
    ) -> bool {
        self.reservations.values().any(|existing| {
            Some(existing.id) != ignore
                && existing.staff_id == staff_id
                && existing.status.holds_window()
                && existing.overlaps(starts_at, ends_at)
        })
    }

    fn balance_of(&self, customer_id: CustomerId) -> i64 {
        self.balances
            .get(&customer_id)
            .map(|b| b.balance)
            .unwrap_or(0)
    }

    /// Apply a signed change to a balance and record it in the ledger
    fn post_points(
        &mut self,
        customer_id: CustomerId,
        reservation_id: Option<ReservationId>,
        kind: PointTransactionKind,
        delta: i64,
        now: DateTime<Utc>,
    ) {
        let entry = self.balances.entry(customer_id).or_insert(PointBalance {
            customer_id,
            balance: 0,
            last_transaction_at: None,
        });
        entry.balance += delta;
        entry.last_transaction_at = Some(now);
        let balance_after = entry.balance;

        self.transactions.push(PointTransaction {
            id: Uuid::new_v4(),
            customer_id,
            reservation_id,
            kind,
            delta,
            balance_after,
            created_at: now,
        });
    }

    fn accrual_id_for(&self, reservation_id: ReservationId) -> Option<Uuid> {
        self.accruals
            .values()
            .find(|task| task.reservation_id == reservation_id)
            .map(|task| task.id)
    }

    fn reservation_in(
        &mut self,
        id: ReservationId,
        expected: ReservationStatus,
    ) -> BookingResult<&mut Reservation> {
        let reservation = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("Reservation", id))?;
        if reservation.status != expected {
            return Err(BookingError::conflict(format!(
                "reservation {} is {}, expected {}",
                id, reservation.status, expected
            )));
        }
        Ok(reservation)
    }
}

/// Store that keeps every table in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_salon_settings(&self, settings: SalonSettings) {
        self.state.lock().await.salons.insert(settings.salon_id, settings);
    }

    pub async fn add_working_hours(&self, rule: WorkingHoursRule) {
        self.state.lock().await.working_hours.push(rule);
    }

    pub async fn add_exception(&self, exception: ScheduleException) {
        self.state.lock().await.exceptions.push(exception);
    }

    pub async fn put_staff(&self, staff: StaffMember) {
        self.state.lock().await.staff.insert(staff.id, staff);
    }

    pub async fn put_menu(&self, menu: Menu) {
        self.state.lock().await.menus.insert(menu.id, menu);
    }

    pub async fn put_option(&self, option: MenuOption) {
        self.state.lock().await.options.insert(option.id, option);
    }

    pub async fn put_coupon(&self, coupon: Coupon) {
        self.state.lock().await.coupons.insert(coupon.id, coupon);
    }

    pub async fn coupon(&self, coupon_id: CouponId) -> Option<Coupon> {
        self.state.lock().await.coupons.get(&coupon_id).cloned()
    }

    /// Seed a balance without recording a ledger transaction
    pub async fn set_point_balance(&self, customer_id: CustomerId, balance: i64) {
        self.state.lock().await.balances.insert(
            customer_id,
            PointBalance {
                customer_id,
                balance,
                last_transaction_at: None,
            },
        );
    }

    pub async fn reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.reservations.values().cloned().collect()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryStore {
    async fn salon_settings(&self, salon_id: SalonId) -> BookingResult<Option<SalonSettings>> {
        Ok(self.state.lock().await.salons.get(&salon_id).cloned())
    }

    async fn working_hours(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        day_of_week: i16,
    ) -> BookingResult<Vec<WorkingHoursRule>> {
        let state = self.state.lock().await;
        Ok(state
            .working_hours
            .iter()
            .filter(|rule| {
                rule.salon_id == salon_id
                    && rule.day_of_week == day_of_week
                    && rule.staff_id.map_or(true, |id| id == staff_id)
            })
            .cloned()
            .collect())
    }

    async fn schedule_exceptions(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<ScheduleException>> {
        let state = self.state.lock().await;
        Ok(state
            .exceptions
            .iter()
            .filter(|exception| {
                exception.salon_id == salon_id
                    && exception.date == date
                    && exception.staff_id.map_or(true, |id| id == staff_id)
            })
            .cloned()
            .collect())
    }

    async fn booked_windows(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<BookedWindow>> {
        let state = self.state.lock().await;
        let mut windows: Vec<BookedWindow> = state
            .reservations
            .values()
            .filter(|r| r.staff_id == staff_id && r.local_date == date && r.status.holds_window())
            .map(|r| BookedWindow {
                reservation_id: r.id,
                starts_at: r.starts_at,
                ends_at: r.ends_at,
            })
            .collect();
        windows.sort_by_key(|w| w.starts_at);
        Ok(windows)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn staff_member(&self, staff_id: StaffId) -> BookingResult<Option<StaffMember>> {
        Ok(self.state.lock().await.staff.get(&staff_id).cloned())
    }

    async fn salon_staff(&self, salon_id: SalonId) -> BookingResult<Vec<StaffMember>> {
        let state = self.state.lock().await;
        let mut staff: Vec<StaffMember> = state
            .staff
            .values()
            .filter(|s| s.salon_id == salon_id)
            .cloned()
            .collect();
        staff.sort_by_key(|s| s.id);
        Ok(staff)
    }

    async fn menu(&self, menu_id: MenuId) -> BookingResult<Option<Menu>> {
        Ok(self.state.lock().await.menus.get(&menu_id).cloned())
    }

    async fn menu_options(&self, option_ids: &[OptionId]) -> BookingResult<Vec<MenuOption>> {
        let state = self.state.lock().await;
        let mut options: Vec<MenuOption> = state
            .options
            .values()
            .filter(|o| option_ids.contains(&o.id))
            .cloned()
            .collect();
        options.sort_by_key(|o| o.id);
        Ok(options)
    }

    async fn coupon_by_code(
        &self,
        salon_id: SalonId,
        code: &str,
    ) -> BookingResult<Option<Coupon>> {
        let state = self.state.lock().await;
        Ok(state
            .coupons
            .values()
            .find(|c| c.salon_id == salon_id && c.code == code)
            .cloned())
    }

    async fn purge_archived(&self, cutoff: DateTime<Utc>) -> BookingResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.staff.len() + state.menus.len() + state.options.len() + state.coupons.len();

        state.staff.retain(|_, s| !s.lifecycle().is_purgeable(cutoff));
        state.menus.retain(|_, m| !m.lifecycle().is_purgeable(cutoff));
        state.options.retain(|_, o| !o.lifecycle().is_purgeable(cutoff));
        state.coupons.retain(|_, c| !c.lifecycle().is_purgeable(cutoff));

        let after = state.staff.len() + state.menus.len() + state.options.len() + state.coupons.len();
        Ok((before - after) as u64)
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn reservation(&self, id: ReservationId) -> BookingResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn commit_booking(&self, booking: NewBooking) -> BookingResult<Reservation> {
        let mut state = self.state.lock().await;
        let reservation = booking.reservation;

        // All checks run before the first write so a failure leaves nothing behind
        if state.has_overlap(
            reservation.staff_id,
            reservation.starts_at,
            reservation.ends_at,
            None,
        ) {
            return Err(BookingError::conflict(format!(
                "staff {} already has a reservation overlapping {}",
                reservation.staff_id, reservation.starts_at
            )));
        }

        if let Some(coupon_id) = reservation.coupon_id {
            let coupon = state
                .coupons
                .get(&coupon_id)
                .ok_or_else(|| BookingError::not_found("Coupon", coupon_id))?;
            if !coupon.has_uses_left() {
                return Err(CouponRejection::Exhausted {
                    code: coupon.code.clone(),
                    max_use_count: coupon.max_use_count.unwrap_or_default(),
                }
                .into());
            }
        }

        let balance = state.balance_of(reservation.customer_id);
        if reservation.points_redeemed > balance {
            return Err(BookingError::InvalidArgument(format!(
                "balance {} no longer covers {} points",
                balance, reservation.points_redeemed
            )));
        }

        if let Some(coupon) = reservation
            .coupon_id
            .and_then(|id| state.coupons.get_mut(&id))
        {
            coupon.use_count += 1;
        }

        if reservation.points_redeemed > 0 {
            state.post_points(
                reservation.customer_id,
                Some(reservation.id),
                PointTransactionKind::Redeem,
                -reservation.points_redeemed,
                reservation.created_at,
            );
        }

        if let Some(code) = booking.auth_code {
            state.auth_codes.insert(reservation.id, code);
        }
        state.accruals.insert(booking.accrual.id, booking.accrual);
        state.reservations.insert(reservation.id, reservation.clone());

        Ok(reservation)
    }

    async fn release_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<ReleasedBooking> {
        let mut state = self.state.lock().await;

        let reservation = state.reservation_in(id, expected)?;
        reservation.status = status;
        reservation.updated_at = now;
        let reservation = reservation.clone();

        let auth_code_deleted = state.auth_codes.remove(&id).is_some();
        let accrual_deleted = match state.accrual_id_for(id) {
            Some(task_id) => state.accruals.remove(&task_id).is_some(),
            None => false,
        };

        let points_credited = reservation.points_redeemed;
        if points_credited > 0 {
            state.post_points(
                reservation.customer_id,
                Some(id),
                PointTransactionKind::Refund,
                points_credited,
                now,
            );
        }

        Ok(ReleasedBooking {
            reservation,
            points_credited,
            auth_code_deleted,
            accrual_deleted,
        })
    }

    async fn complete_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation> {
        let mut state = self.state.lock().await;

        let reservation = state.reservation_in(id, expected)?;
        reservation.status = ReservationStatus::Completed;
        reservation.updated_at = now;
        let reservation = reservation.clone();

        state.auth_codes.remove(&id);
        Ok(reservation)
    }

    async fn reschedule_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        window: RescheduledWindow,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation> {
        let mut state = self.state.lock().await;

        let staff_id = state.reservation_in(id, expected)?.staff_id;
        if state.has_overlap(staff_id, window.starts_at, window.ends_at, Some(id)) {
            return Err(BookingError::conflict(format!(
                "staff {} already has a reservation overlapping {}",
                staff_id, window.starts_at
            )));
        }

        let reservation = state.reservation_in(id, expected)?;
        reservation.starts_at = window.starts_at;
        reservation.ends_at = window.ends_at;
        reservation.local_date = window.local_date;
        reservation.updated_at = now;
        let reservation = reservation.clone();

        if let Some(code) = state.auth_codes.get_mut(&id) {
            code.expires_at = window.auth_code_expires_at;
        }
        if let Some(task_id) = state.accrual_id_for(id) {
            if let Some(task) = state.accruals.get_mut(&task_id) {
                task.scheduled_for = window.accrual_scheduled_for;
            }
        }

        Ok(reservation)
    }
}

#[async_trait]
impl PointStore for InMemoryStore {
    async fn point_balance(&self, customer_id: CustomerId) -> BookingResult<i64> {
        Ok(self.state.lock().await.balance_of(customer_id))
    }

    async fn auth_code_for(
        &self,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<PointAuthCode>> {
        Ok(self.state.lock().await.auth_codes.get(&reservation_id).cloned())
    }

    async fn consume_auth_code(&self, auth_code_id: Uuid) -> BookingResult<bool> {
        let mut state = self.state.lock().await;
        let reservation_id = state
            .auth_codes
            .values()
            .find(|code| code.id == auth_code_id)
            .map(|code| code.reservation_id);

        Ok(match reservation_id {
            Some(reservation_id) => state.auth_codes.remove(&reservation_id).is_some(),
            None => false,
        })
    }

    async fn accrual_task_for(
        &self,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<PointAccrualTask>> {
        let state = self.state.lock().await;
        Ok(state
            .accruals
            .values()
            .find(|task| task.reservation_id == reservation_id)
            .cloned())
    }

    async fn due_accrual_tasks(&self, now: DateTime<Utc>) -> BookingResult<Vec<PointAccrualTask>> {
        let state = self.state.lock().await;
        let mut due: Vec<PointAccrualTask> = state
            .accruals
            .values()
            .filter(|task| task.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|task| (task.scheduled_for, task.id));
        Ok(due)
    }

    async fn apply_accrual(
        &self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<AccrualOutcome> {
        let mut state = self.state.lock().await;
        let Some(task) = state.accruals.get(&task_id).cloned() else {
            return Ok(AccrualOutcome::Missing);
        };

        let status = state
            .reservations
            .get(&task.reservation_id)
            .map(|r| r.status);
        match status {
            Some(ReservationStatus::Completed) => {}
            Some(ReservationStatus::Pending | ReservationStatus::Confirmed) => {
                return Ok(AccrualOutcome::Deferred);
            }
            _ => {
                state.accruals.remove(&task_id);
                return Ok(AccrualOutcome::Dropped);
            }
        }

        state.accruals.remove(&task_id);
        state.post_points(
            task.customer_id,
            Some(task.reservation_id),
            PointTransactionKind::Accrual,
            task.points,
            now,
        );
        Ok(AccrualOutcome::Credited)
    }

    async fn purge_expired_auth_codes(&self, now: DateTime<Utc>) -> BookingResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.auth_codes.len();
        state.auth_codes.retain(|_, code| !code.is_expired(now));
        Ok((before - state.auth_codes.len()) as u64)
    }

    async fn point_transactions(
        &self,
        customer_id: CustomerId,
    ) -> BookingResult<Vec<PointTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, hour, minute, 0).unwrap()
    }

    fn reservation(staff_id: StaffId, start: DateTime<Utc>, minutes: i64, points: i64) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            salon_id: 1,
            customer_id: 7,
            staff_id,
            menu_id: 1,
            option_ids: vec![],
            starts_at: start,
            ends_at: start + Duration::minutes(minutes),
            local_date: start.date_naive(),
            status: ReservationStatus::Confirmed,
            coupon_id: None,
            subtotal: 5000,
            staff_premium: 0,
            coupon_discount: 0,
            points_redeemed: points,
            total_price: 5000 - points,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    fn booking(reservation: Reservation) -> NewBooking {
        let accrual = PointAccrualTask {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            customer_id: reservation.customer_id,
            points: 50,
            scheduled_for: at(23, 0),
            created_at: at(8, 0),
        };
        NewBooking {
            reservation,
            auth_code: None,
            accrual,
        }
    }

    #[tokio::test]
    async fn test_commit_rejects_overlapping_window() {
        let store = InMemoryStore::new();
        store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 0)))
            .await
            .unwrap();

        let result = store
            .commit_booking(booking(reservation(1, at(10, 30), 60, 0)))
            .await;
        assert!(matches!(result, Err(BookingError::Conflict { .. })));

        // Back-to-back and other staff are fine
        store
            .commit_booking(booking(reservation(1, at(11, 0), 30, 0)))
            .await
            .unwrap();
        store
            .commit_booking(booking(reservation(2, at(10, 30), 60, 0)))
            .await
            .unwrap();
        assert_eq!(store.reservations().await.len(), 3);
    }

    #[tokio::test]
    async fn test_commit_with_insufficient_balance_leaves_no_state() {
        let store = InMemoryStore::new();
        store.set_point_balance(7, 100).await;

        let result = store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 500)))
            .await;
        assert!(matches!(result, Err(BookingError::InvalidArgument(_))));
        assert!(store.reservations().await.is_empty());
        assert_eq!(store.point_balance(7).await.unwrap(), 100);
        assert!(store.due_accrual_tasks(at(23, 59)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_credits_back_points_once() {
        let store = InMemoryStore::new();
        store.set_point_balance(7, 1000).await;
        let r = store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 300)))
            .await
            .unwrap();
        assert_eq!(store.point_balance(7).await.unwrap(), 700);

        let released = store
            .release_booking(r.id, ReservationStatus::Confirmed, ReservationStatus::Cancelled, at(9, 0))
            .await
            .unwrap();
        assert_eq!(released.points_credited, 300);
        assert!(released.accrual_deleted);
        assert_eq!(store.point_balance(7).await.unwrap(), 1000);

        // A second release sees the changed status and refuses
        let again = store
            .release_booking(r.id, ReservationStatus::Confirmed, ReservationStatus::Cancelled, at(9, 1))
            .await;
        assert!(matches!(again, Err(BookingError::Conflict { .. })));
        assert_eq!(store.point_balance(7).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_apply_accrual_is_idempotent() {
        let store = InMemoryStore::new();
        let r = store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 0)))
            .await
            .unwrap();
        let task = store.accrual_task_for(r.id).await.unwrap().unwrap();
        store
            .complete_booking(r.id, ReservationStatus::Confirmed, at(11, 0))
            .await
            .unwrap();

        assert_eq!(
            store.apply_accrual(task.id, at(23, 30)).await.unwrap(),
            AccrualOutcome::Credited
        );
        assert_eq!(
            store.apply_accrual(task.id, at(23, 31)).await.unwrap(),
            AccrualOutcome::Missing
        );
        assert_eq!(store.point_balance(7).await.unwrap(), 50);

        let transactions = store.point_transactions(7).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].kind, PointTransactionKind::Accrual);
        assert_eq!(transactions[0].balance_after, 50);
    }

    #[tokio::test]
    async fn test_commit_rechecks_coupon_cap() {
        let store = InMemoryStore::new();
        store.set_point_balance(7, 1000).await;
        store
            .put_coupon(Coupon {
                id: 3,
                salon_id: 1,
                code: "ONCE".to_string(),
                discount_type: crate::booking::types::DiscountType::Fixed,
                discount_value: 500,
                starts_at: None,
                ends_at: None,
                max_use_count: Some(1),
                use_count: 0,
                excluded_menu_ids: vec![],
                archived_at: None,
            })
            .await;

        // Both were priced while the coupon still had a use left
        let mut first = reservation(1, at(10, 0), 60, 200);
        first.coupon_id = Some(3);
        let mut second = reservation(2, at(10, 0), 60, 200);
        second.coupon_id = Some(3);

        store.commit_booking(booking(first)).await.unwrap();
        let result = store.commit_booking(booking(second.clone())).await;

        assert!(matches!(
            result,
            Err(BookingError::Coupon(CouponRejection::Exhausted { max_use_count: 1, .. }))
        ));
        assert_eq!(store.coupon(3).await.unwrap().use_count, 1);
        assert_eq!(store.point_balance(7).await.unwrap(), 800);
        assert!(store.accrual_task_for(second.id).await.unwrap().is_none());
        assert_eq!(store.reservations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_accrual_waits_for_completion() {
        let store = InMemoryStore::new();
        let served = store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 0)))
            .await
            .unwrap();
        let task = store.accrual_task_for(served.id).await.unwrap().unwrap();

        // Still confirmed: nothing credited, task kept for a later sweep
        assert_eq!(
            store.apply_accrual(task.id, at(23, 30)).await.unwrap(),
            AccrualOutcome::Deferred
        );
        assert!(store.accrual_task_for(served.id).await.unwrap().is_some());
        assert_eq!(store.point_balance(7).await.unwrap(), 0);

        store
            .complete_booking(served.id, ReservationStatus::Confirmed, at(23, 40))
            .await
            .unwrap();
        assert_eq!(
            store.apply_accrual(task.id, at(23, 45)).await.unwrap(),
            AccrualOutcome::Credited
        );
        assert_eq!(store.point_balance(7).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_booked_windows_skip_cancelled() {
        let store = InMemoryStore::new();
        let kept = store
            .commit_booking(booking(reservation(1, at(10, 0), 60, 0)))
            .await
            .unwrap();
        let dropped = store
            .commit_booking(booking(reservation(1, at(12, 0), 60, 0)))
            .await
            .unwrap();
        store
            .release_booking(dropped.id, ReservationStatus::Confirmed, ReservationStatus::Cancelled, at(9, 0))
            .await
            .unwrap();

        let windows = store.booked_windows(1, at(0, 0).date_naive()).await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].reservation_id, kept.id);
    }
}
