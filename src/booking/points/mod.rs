// Point Ledger
//
// Customer point balances plus the two point artifacts tied to a reservation:
// the deferred accrual task (queued on every confirmation, credited by the
// sweep on the 15th of the following month) and the one-time authorization
// code issued when a booking redeems points.
//
// Balance mutations happen only inside store units of work: the debit lands
// with the reservation insert, credits land with cancellation or the sweep.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::booking::error::{BookingError, BookingResult};
use crate::booking::metrics::PerformanceMetrics;
use crate::booking::models::{PointAccrualTask, PointAuthCode};
use crate::booking::slots::SalonCalendar;
use crate::booking::store::{AccrualOutcome, PointStore};
use crate::booking::types::{CustomerId, ReservationId};

/// Characters an authorization code is drawn from
const AUTH_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Day of the month accruals are credited on
const ACCRUAL_DAY_OF_MONTH: u32 = 15;

/// Tunables of the point program
#[derive(Debug, Clone)]
pub struct PointPolicy {
    /// Points earned per 100 units of final price
    pub accrual_rate_percent: i64,
    pub auth_code_length: usize,
    /// How long after the reservation ends an auth code stays redeemable
    pub auth_code_grace: Duration,
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            accrual_rate_percent: 1,
            auth_code_length: 8,
            auth_code_grace: Duration::hours(24),
        }
    }
}

/// One accrual task the sweep could not apply
#[derive(Debug, Clone, Serialize)]
pub struct AccrualFailure {
    pub task_id: Uuid,
    pub reservation_id: ReservationId,
    pub error: String,
}

/// Outcome of one accrual sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Tasks credited and deleted by this run
    pub processed: usize,
    /// Tasks left queued because their reservation is not completed yet
    pub deferred: usize,
    /// Tasks deleted uncredited because their reservation was never served
    pub dropped: usize,
    /// Tasks that vanished between listing and applying
    pub skipped: usize,
    pub failures: Vec<AccrualFailure>,
}

/// Generate an uppercase alphanumeric one-time code
pub fn generate_auth_code(length: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| AUTH_CODE_CHARSET[rng.gen_range(0..AUTH_CODE_CHARSET.len())] as char)
        .collect()
}

/// Salon-local date accruals for a reservation on `effective_date` are credited
pub fn accrual_date(effective_date: NaiveDate) -> BookingResult<NaiveDate> {
    let (year, month) = match effective_date.month() {
        12 => (effective_date.year() + 1, 1),
        month => (effective_date.year(), month + 1),
    };
    NaiveDate::from_ymd_opt(year, month, ACCRUAL_DAY_OF_MONTH).ok_or_else(|| {
        BookingError::InvalidArgument(format!("no accrual date after {}", effective_date))
    })
}

pub struct PointLedger {
    store: Arc<dyn PointStore>,
    policy: PointPolicy,
    metrics: Option<PerformanceMetrics>,
}

impl PointLedger {
    pub fn new(store: Arc<dyn PointStore>, policy: PointPolicy) -> Self {
        Self {
            store,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &PointPolicy {
        &self.policy
    }

    pub async fn balance(&self, customer_id: CustomerId) -> BookingResult<i64> {
        self.store.point_balance(customer_id).await
    }

    /// Check that the customer holds `amount` points; the balance is not touched
    pub async fn reserve_redemption(&self, customer_id: CustomerId, amount: i64) -> BookingResult<()> {
        if amount < 0 {
            return Err(BookingError::InvalidArgument(format!(
                "redemption amount cannot be negative, got {}",
                amount
            )));
        }

        let balance = self.balance(customer_id).await?;
        if amount > balance {
            return Err(BookingError::InvalidArgument(format!(
                "customer {} holds {} points, cannot redeem {}",
                customer_id, balance, amount
            )));
        }
        Ok(())
    }

    /// floor(final price * rate / 100)
    pub fn accrual_points(&self, final_price: i64) -> i64 {
        (final_price.max(0) * self.policy.accrual_rate_percent.max(0)) / 100
    }

    /// Build the accrual task for a reservation on `effective_date`.
    /// It is persisted together with the reservation.
    pub fn schedule_accrual(
        &self,
        reservation_id: ReservationId,
        customer_id: CustomerId,
        points: i64,
        calendar: SalonCalendar,
        effective_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> BookingResult<PointAccrualTask> {
        let credit_on = accrual_date(effective_date)?;
        Ok(PointAccrualTask {
            id: Uuid::new_v4(),
            reservation_id,
            customer_id,
            points,
            scheduled_for: calendar.instant(credit_on, 0),
            created_at: now,
        })
    }

    /// Scheduled-for instant of an accrual after the reservation moved
    pub fn accrual_instant(
        &self,
        calendar: SalonCalendar,
        effective_date: NaiveDate,
    ) -> BookingResult<DateTime<Utc>> {
        Ok(calendar.instant(accrual_date(effective_date)?, 0))
    }

    /// Expiry of an auth code for a reservation ending at `ends_at`
    pub fn auth_code_expiry(&self, ends_at: DateTime<Utc>) -> DateTime<Utc> {
        ends_at + self.policy.auth_code_grace
    }

    /// Build a fresh auth code for a reservation that redeems points.
    /// It is persisted together with the reservation.
    pub fn issue_auth_code(
        &self,
        reservation_id: ReservationId,
        customer_id: CustomerId,
        points: i64,
        ends_at: DateTime<Utc>,
    ) -> PointAuthCode {
        PointAuthCode {
            id: Uuid::new_v4(),
            reservation_id,
            customer_id,
            code: generate_auth_code(self.policy.auth_code_length),
            points,
            expires_at: self.auth_code_expiry(ends_at),
        }
    }

    /// Verify and consume the auth code of a reservation.
    ///
    /// An expired code is reported as `Expired` and left in place for the
    /// maintenance sweep; a code that does not match, or whose points differ
    /// from what the reservation redeemed, is `InvalidCode`.
    pub async fn redeem_auth_code(
        &self,
        reservation_id: ReservationId,
        code: &str,
        expected_points: i64,
        now: DateTime<Utc>,
    ) -> BookingResult<PointAuthCode> {
        let stored = self
            .store
            .auth_code_for(reservation_id)
            .await?
            .ok_or(BookingError::InvalidCode)?;

        if stored.is_expired(now) {
            return Err(BookingError::Expired {
                expired_at: stored.expires_at,
            });
        }

        if !stored.code.eq_ignore_ascii_case(code.trim()) || stored.points != expected_points {
            tracing::warn!(%reservation_id, "Auth code mismatch");
            return Err(BookingError::InvalidCode);
        }

        // Someone else consumed it between the read and the delete
        if !self.store.consume_auth_code(stored.id).await? {
            return Err(BookingError::InvalidCode);
        }

        tracing::info!(
            %reservation_id,
            customer_id = stored.customer_id,
            points = stored.points,
            "Auth code redeemed"
        );
        Ok(stored)
    }

    /// Credit every accrual task due at `now`.
    ///
    /// Each task is credited and deleted in one unit of work, so re-running
    /// the sweep never double-credits. Only completed reservations earn
    /// points; tasks of bookings still awaiting service stay queued. A failing
    /// task does not stop the rest.
    pub async fn run_accrual_sweep(&self, now: DateTime<Utc>) -> BookingResult<SweepReport> {
        let due = self.store.due_accrual_tasks(now).await?;
        let mut report = SweepReport::default();

        for task in due {
            match self.store.apply_accrual(task.id, now).await {
                Ok(AccrualOutcome::Credited) => {
                    report.processed += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_accrual_processed();
                    }
                }
                Ok(AccrualOutcome::Deferred) => report.deferred += 1,
                Ok(AccrualOutcome::Dropped) => report.dropped += 1,
                Ok(AccrualOutcome::Missing) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        task_id = %task.id,
                        reservation_id = %task.reservation_id,
                        error = %e,
                        "Failed to apply accrual task"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_accrual_failed();
                    }
                    report.failures.push(AccrualFailure {
                        task_id: task.id,
                        reservation_id: task.reservation_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            deferred = report.deferred,
            dropped = report.dropped,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Accrual sweep finished"
        );
        Ok(report)
    }

    /// Delete auth codes that expired at or before `now`
    pub async fn purge_expired_codes(&self, now: DateTime<Utc>) -> BookingResult<u64> {
        self.store.purge_expired_auth_codes(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::models::Reservation;
    use crate::booking::models::PointTransaction;
    use crate::booking::store::{InMemoryStore, NewBooking, ReservationRepository};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use crate::booking::types::ReservationStatus;
    use chrono::TimeZone;

    fn ledger(store: Arc<InMemoryStore>) -> PointLedger {
        PointLedger::new(store, PointPolicy::default())
    }

    #[test]
    fn test_generate_auth_code() {
        let code = generate_auth_code(8);
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_accrual_date_is_fifteenth_of_next_month() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(accrual_date(d(2026, 6, 1)).unwrap(), d(2026, 7, 15));
        assert_eq!(accrual_date(d(2026, 6, 30)).unwrap(), d(2026, 7, 15));
        assert_eq!(accrual_date(d(2026, 12, 20)).unwrap(), d(2027, 1, 15));
    }

    #[test]
    fn test_accrual_points_are_floored() {
        let ledger = ledger(Arc::new(InMemoryStore::new()));
        assert_eq!(ledger.accrual_points(8200), 82);
        assert_eq!(ledger.accrual_points(199), 1);
        assert_eq!(ledger.accrual_points(99), 0);
        assert_eq!(ledger.accrual_points(0), 0);
    }

    #[test]
    fn test_schedule_accrual_uses_local_midnight() {
        let ledger = ledger(Arc::new(InMemoryStore::new()));
        let calendar = SalonCalendar::new(9 * 60);
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let task = ledger
            .schedule_accrual(
                Uuid::new_v4(),
                1,
                82,
                calendar,
                NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
                now,
            )
            .unwrap();
        // Local midnight on July 15th at UTC+9
        assert_eq!(
            task.scheduled_for,
            Utc.with_ymd_and_hms(2026, 7, 14, 15, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_reserve_redemption() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 500).await;
        let ledger = ledger(store);

        assert!(ledger.reserve_redemption(1, 500).await.is_ok());
        assert!(matches!(
            ledger.reserve_redemption(1, 501).await,
            Err(BookingError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.reserve_redemption(1, -1).await,
            Err(BookingError::InvalidArgument(_))
        ));
        // Nothing was debited
        assert_eq!(ledger.balance(1).await.unwrap(), 500);
    }

    async fn booked_with_code(store: &Arc<InMemoryStore>, ledger: &PointLedger) -> (Reservation, PointAuthCode) {
        booked_with_code_at(store, ledger, 10).await
    }

    async fn booked_with_code_at(
        store: &Arc<InMemoryStore>,
        ledger: &PointLedger,
        hour: u32,
    ) -> (Reservation, PointAuthCode) {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).unwrap();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            salon_id: 1,
            customer_id: 1,
            staff_id: 1,
            menu_id: 1,
            option_ids: vec![],
            starts_at: start,
            ends_at: start + Duration::hours(1),
            local_date: start.date_naive(),
            status: ReservationStatus::Confirmed,
            coupon_id: None,
            subtotal: 5000,
            staff_premium: 0,
            coupon_discount: 0,
            points_redeemed: 300,
            total_price: 4700,
            created_at: start - Duration::days(1),
            updated_at: start - Duration::days(1),
        };
        let code = ledger.issue_auth_code(reservation.id, 1, 300, reservation.ends_at);
        let accrual = ledger
            .schedule_accrual(
                reservation.id,
                1,
                47,
                SalonCalendar::new(0),
                reservation.local_date,
                reservation.created_at,
            )
            .unwrap();
        store
            .commit_booking(NewBooking {
                reservation: reservation.clone(),
                auth_code: Some(code.clone()),
                accrual,
            })
            .await
            .unwrap();
        (reservation, code)
    }

    #[tokio::test]
    async fn test_redeem_auth_code_once() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 1000).await;
        let ledger = ledger(store.clone());
        let (reservation, code) = booked_with_code(&store, &ledger).await;
        let now = reservation.starts_at;

        assert!(matches!(
            ledger.redeem_auth_code(reservation.id, "WRONG123", 300, now).await,
            Err(BookingError::InvalidCode)
        ));
        assert!(matches!(
            ledger.redeem_auth_code(reservation.id, &code.code, 299, now).await,
            Err(BookingError::InvalidCode)
        ));

        let redeemed = ledger
            .redeem_auth_code(reservation.id, &code.code.to_lowercase(), 300, now)
            .await
            .unwrap();
        assert_eq!(redeemed.points, 300);

        assert!(matches!(
            ledger.redeem_auth_code(reservation.id, &code.code, 300, now).await,
            Err(BookingError::InvalidCode)
        ));
        // The debit happened at booking time only
        assert_eq!(ledger.balance(1).await.unwrap(), 700);
    }

    #[tokio::test]
    async fn test_expired_code_is_inert() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 1000).await;
        let ledger = ledger(store.clone());
        let (reservation, code) = booked_with_code(&store, &ledger).await;

        let result = ledger
            .redeem_auth_code(reservation.id, &code.code, 300, code.expires_at)
            .await;
        assert!(matches!(result, Err(BookingError::Expired { .. })));
        // Still stored until the maintenance sweep removes it
        assert!(store.auth_code_for(reservation.id).await.unwrap().is_some());

        assert_eq!(ledger.purge_expired_codes(code.expires_at).await.unwrap(), 1);
        assert!(store.auth_code_for(reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_credits_due_tasks_once() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 1000).await;
        let ledger = ledger(store.clone());
        let (reservation, _) = booked_with_code(&store, &ledger).await;
        store
            .complete_booking(reservation.id, ReservationStatus::Confirmed, reservation.ends_at)
            .await
            .unwrap();

        let before_due = Utc.with_ymd_and_hms(2026, 7, 14, 23, 59, 0).unwrap();
        assert_eq!(ledger.run_accrual_sweep(before_due).await.unwrap().processed, 0);

        let due = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        let first = ledger.run_accrual_sweep(due).await.unwrap();
        let second = ledger.run_accrual_sweep(due).await.unwrap();

        assert_eq!(first.processed, 1);
        assert!(first.failures.is_empty());
        assert_eq!(second.processed, 0);
        assert_eq!(ledger.balance(1).await.unwrap(), 700 + 47);
    }

    #[tokio::test]
    async fn test_sweep_keeps_tasks_of_unserved_bookings() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 1000).await;
        let ledger = ledger(store.clone());
        let (reservation, _) = booked_with_code(&store, &ledger).await;

        let due = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        let report = ledger.run_accrual_sweep(due).await.unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.deferred, 1);
        assert_eq!(ledger.balance(1).await.unwrap(), 700);
        assert!(store.accrual_task_for(reservation.id).await.unwrap().is_some());

        // Served late: the next sweep picks the kept task up
        store
            .complete_booking(reservation.id, ReservationStatus::Confirmed, due)
            .await
            .unwrap();
        let report = ledger.run_accrual_sweep(due).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(ledger.balance(1).await.unwrap(), 700 + 47);
    }

    /// Store whose accrual credit fails for chosen tasks
    struct FlakyPointStore {
        inner: Arc<InMemoryStore>,
        failing: HashSet<Uuid>,
    }

    #[async_trait]
    impl PointStore for FlakyPointStore {
        async fn point_balance(&self, customer_id: CustomerId) -> BookingResult<i64> {
            self.inner.point_balance(customer_id).await
        }

        async fn auth_code_for(
            &self,
            reservation_id: ReservationId,
        ) -> BookingResult<Option<PointAuthCode>> {
            self.inner.auth_code_for(reservation_id).await
        }

        async fn consume_auth_code(&self, auth_code_id: Uuid) -> BookingResult<bool> {
            self.inner.consume_auth_code(auth_code_id).await
        }

        async fn accrual_task_for(
            &self,
            reservation_id: ReservationId,
        ) -> BookingResult<Option<PointAccrualTask>> {
            self.inner.accrual_task_for(reservation_id).await
        }

        async fn due_accrual_tasks(
            &self,
            now: DateTime<Utc>,
        ) -> BookingResult<Vec<PointAccrualTask>> {
            self.inner.due_accrual_tasks(now).await
        }

        async fn apply_accrual(
            &self,
            task_id: Uuid,
            now: DateTime<Utc>,
        ) -> BookingResult<AccrualOutcome> {
            if self.failing.contains(&task_id) {
                return Err(BookingError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.apply_accrual(task_id, now).await
        }

        async fn purge_expired_auth_codes(&self, now: DateTime<Utc>) -> BookingResult<u64> {
            self.inner.purge_expired_auth_codes(now).await
        }

        async fn point_transactions(
            &self,
            customer_id: CustomerId,
        ) -> BookingResult<Vec<PointTransaction>> {
            self.inner.point_transactions(customer_id).await
        }
    }

    #[tokio::test]
    async fn test_failing_task_does_not_stop_the_sweep() {
        let store = Arc::new(InMemoryStore::new());
        store.set_point_balance(1, 1000).await;
        let setup = ledger(store.clone());

        let mut booked = Vec::new();
        for hour in [10, 12, 14] {
            let (reservation, _) = booked_with_code_at(&store, &setup, hour).await;
            store
                .complete_booking(reservation.id, ReservationStatus::Confirmed, reservation.ends_at)
                .await
                .unwrap();
            booked.push(reservation);
        }
        let broken = store.accrual_task_for(booked[1].id).await.unwrap().unwrap();

        let flaky = FlakyPointStore {
            inner: store.clone(),
            failing: HashSet::from([broken.id]),
        };
        let ledger = PointLedger::new(Arc::new(flaky), PointPolicy::default());

        let due = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        let report = ledger.run_accrual_sweep(due).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].task_id, broken.id);
        assert_eq!(report.failures[0].reservation_id, booked[1].id);

        // Three debits of 300, two credits of 47; the failed task waits
        assert_eq!(ledger.balance(1).await.unwrap(), 1000 - 900 + 94);
        assert!(store.accrual_task_for(booked[1].id).await.unwrap().is_some());
        assert!(store.accrual_task_for(booked[0].id).await.unwrap().is_none());
    }
}
