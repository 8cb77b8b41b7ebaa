// Postgres store
//
// Every unit of work runs in one transaction. Booking writes take a
// transaction-scoped advisory lock on (staff, local date) before the overlap
// check, and the reservations table carries an exclusion constraint so a
// double booking is impossible even for writers that skip the lock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::booking::error::{BookingError, BookingResult, CouponRejection};
use crate::booking::models::{
    BookedWindow, Coupon, Menu, MenuOption, PointAccrualTask, PointAuthCode, PointTransaction,
    Reservation, SalonSettings, ScheduleException, StaffMember, WorkingHoursRule,
};
use crate::booking::store::{
    AccrualOutcome, AvailabilityStore, CatalogRepository, NewBooking, PointStore, ReleasedBooking,
    RescheduledWindow, ReservationRepository,
};
use crate::booking::types::{
    CustomerId, MenuId, OptionId, PointTransactionKind, ReservationId, ReservationStatus,
    SalonId, StaffId,
};

const RESERVATION_COLUMNS: &str = "id, salon_id, customer_id, staff_id, menu_id, option_ids, \
     starts_at, ends_at, local_date, status, coupon_id, subtotal, staff_premium, \
     coupon_discount, points_redeemed, total_price, created_at, updated_at";

const HOLDING_STATUSES: &str = "('pending', 'confirmed', 'completed')";

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Serialize booking writers for one staff member on one salon-local date
async fn lock_staff_day(
    conn: &mut PgConnection,
    staff_id: StaffId,
    date: NaiveDate,
) -> BookingResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("booking:{}:{}", staff_id, date))
        .execute(conn)
        .await?;
    Ok(())
}

async fn has_overlap(
    conn: &mut PgConnection,
    staff_id: StaffId,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    ignore: Option<ReservationId>,
) -> BookingResult<bool> {
    let query = format!(
        "SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE staff_id = $1
              AND status IN {}
              AND starts_at < $3
              AND $2 < ends_at
              AND ($4::uuid IS NULL OR id <> $4)
        )",
        HOLDING_STATUSES
    );

    let exists: bool = sqlx::query_scalar(&query)
        .bind(staff_id)
        .bind(starts_at)
        .bind(ends_at)
        .bind(ignore)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

async fn lock_reservation(
    conn: &mut PgConnection,
    id: ReservationId,
    expected: ReservationStatus,
) -> BookingResult<Reservation> {
    let query = format!(
        "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
        RESERVATION_COLUMNS
    );
    let reservation = sqlx::query_as::<_, Reservation>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| BookingError::not_found("Reservation", id))?;

    if reservation.status != expected {
        return Err(BookingError::conflict(format!(
            "reservation {} is {}, expected {}",
            id, reservation.status, expected
        )));
    }
    Ok(reservation)
}

/// Apply a signed change to a balance and record it in the ledger
async fn post_points(
    conn: &mut PgConnection,
    customer_id: CustomerId,
    reservation_id: Option<ReservationId>,
    kind: PointTransactionKind,
    delta: i64,
    now: DateTime<Utc>,
) -> BookingResult<i64> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE point_balances
        SET balance = balance + $2, last_transaction_at = $3
        WHERE customer_id = $1
        RETURNING balance
        "#,
    )
    .bind(customer_id)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    // First movement for this customer; only credits can get here
    let balance_after: i64 = match updated {
        Some(balance) => balance,
        None => {
            sqlx::query_scalar(
                r#"
                INSERT INTO point_balances (customer_id, balance, last_transaction_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (customer_id) DO UPDATE
                SET balance = point_balances.balance + EXCLUDED.balance,
                    last_transaction_at = EXCLUDED.last_transaction_at
                RETURNING balance
                "#,
            )
            .bind(customer_id)
            .bind(delta)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO point_transactions (id, customer_id, reservation_id, kind, delta, balance_after, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(reservation_id)
    .bind(kind)
    .bind(delta)
    .bind(balance_after)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(balance_after)
}

#[async_trait]
impl AvailabilityStore for PgStore {
    async fn salon_settings(&self, salon_id: SalonId) -> BookingResult<Option<SalonSettings>> {
        let settings = sqlx::query_as::<_, SalonSettings>(
            "SELECT salon_id, slot_interval_minutes, utc_offset_minutes FROM salon_settings WHERE salon_id = $1",
        )
        .bind(salon_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn working_hours(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        day_of_week: i16,
    ) -> BookingResult<Vec<WorkingHoursRule>> {
        let rules = sqlx::query_as::<_, WorkingHoursRule>(
            r#"
            SELECT salon_id, staff_id, day_of_week, is_open, opens_at, closes_at
            FROM working_hours
            WHERE salon_id = $1
              AND day_of_week = $3
              AND (staff_id IS NULL OR staff_id = $2)
            "#,
        )
        .bind(salon_id)
        .bind(staff_id)
        .bind(day_of_week)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    async fn schedule_exceptions(
        &self,
        salon_id: SalonId,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<ScheduleException>> {
        let exceptions = sqlx::query_as::<_, ScheduleException>(
            r#"
            SELECT salon_id, staff_id, date, is_closed, opens_at, closes_at
            FROM schedule_exceptions
            WHERE salon_id = $1
              AND date = $3
              AND (staff_id IS NULL OR staff_id = $2)
            "#,
        )
        .bind(salon_id)
        .bind(staff_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(exceptions)
    }

    async fn booked_windows(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Vec<BookedWindow>> {
        let query = format!(
            "SELECT id AS reservation_id, starts_at, ends_at
             FROM reservations
             WHERE staff_id = $1 AND local_date = $2 AND status IN {}
             ORDER BY starts_at",
            HOLDING_STATUSES
        );
        let windows = sqlx::query_as::<_, BookedWindow>(&query)
            .bind(staff_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        Ok(windows)
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn staff_member(&self, staff_id: StaffId) -> BookingResult<Option<StaffMember>> {
        let staff = sqlx::query_as::<_, StaffMember>(
            "SELECT id, salon_id, display_name, priority, extra_charge, archived_at FROM staff_members WHERE id = $1",
        )
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(staff)
    }

    async fn salon_staff(&self, salon_id: SalonId) -> BookingResult<Vec<StaffMember>> {
        let staff = sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT id, salon_id, display_name, priority, extra_charge, archived_at
            FROM staff_members
            WHERE salon_id = $1
            ORDER BY id
            "#,
        )
        .bind(salon_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(staff)
    }

    async fn menu(&self, menu_id: MenuId) -> BookingResult<Option<Menu>> {
        let menu = sqlx::query_as::<_, Menu>(
            r#"
            SELECT id, salon_id, name, unit_price, sale_price, duration_minutes, excluded_staff_ids, archived_at
            FROM menus
            WHERE id = $1
            "#,
        )
        .bind(menu_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(menu)
    }

    async fn menu_options(&self, option_ids: &[OptionId]) -> BookingResult<Vec<MenuOption>> {
        let options = sqlx::query_as::<_, MenuOption>(
            r#"
            SELECT id, salon_id, name, unit_price, sale_price, duration_minutes, excluded_staff_ids, archived_at
            FROM menu_options
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(option_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    async fn coupon_by_code(
        &self,
        salon_id: SalonId,
        code: &str,
    ) -> BookingResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, salon_id, code, discount_type, discount_value, starts_at, ends_at,
                   max_use_count, use_count, excluded_menu_ids, archived_at
            FROM coupons
            WHERE salon_id = $1 AND code = $2
            "#,
        )
        .bind(salon_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    async fn purge_archived(&self, cutoff: DateTime<Utc>) -> BookingResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut purged = 0;

        for table in ["staff_members", "menus", "menu_options", "coupons"] {
            let query = format!(
                "DELETE FROM {} WHERE archived_at IS NOT NULL AND archived_at <= $1",
                table
            );
            purged += sqlx::query(&query)
                .bind(cutoff)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(purged)
    }
}

#[async_trait]
impl ReservationRepository for PgStore {
    async fn reservation(&self, id: ReservationId) -> BookingResult<Option<Reservation>> {
        let query = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(reservation)
    }

    async fn commit_booking(&self, booking: NewBooking) -> BookingResult<Reservation> {
        let NewBooking {
            reservation: r,
            auth_code,
            accrual,
        } = booking;

        let mut tx = self.pool.begin().await?;

        lock_staff_day(&mut *tx, r.staff_id, r.local_date).await?;
        if has_overlap(&mut *tx, r.staff_id, r.starts_at, r.ends_at, None).await? {
            return Err(BookingError::conflict(format!(
                "staff {} already has a reservation overlapping {}",
                r.staff_id, r.starts_at
            )));
        }

        if let Some(coupon_id) = r.coupon_id {
            let counted: Option<i32> = sqlx::query_scalar(
                r#"
                UPDATE coupons
                SET use_count = use_count + 1
                WHERE id = $1 AND (max_use_count IS NULL OR use_count < max_use_count)
                RETURNING use_count
                "#,
            )
            .bind(coupon_id)
            .fetch_optional(&mut *tx)
            .await?;

            if counted.is_none() {
                let (code, max_use_count): (String, Option<i32>) =
                    sqlx::query_as("SELECT code, max_use_count FROM coupons WHERE id = $1")
                        .bind(coupon_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or_else(|| BookingError::not_found("Coupon", coupon_id))?;
                return Err(CouponRejection::Exhausted {
                    code,
                    max_use_count: max_use_count.unwrap_or_default(),
                }
                .into());
            }
        }

        if r.points_redeemed > 0 {
            let balance: Option<i64> = sqlx::query_scalar(
                "SELECT balance FROM point_balances WHERE customer_id = $1 FOR UPDATE",
            )
            .bind(r.customer_id)
            .fetch_optional(&mut *tx)
            .await?;

            let balance = balance.unwrap_or(0);
            if balance < r.points_redeemed {
                return Err(BookingError::InvalidArgument(format!(
                    "balance {} no longer covers {} points",
                    balance, r.points_redeemed
                )));
            }

            post_points(
                &mut *tx,
                r.customer_id,
                Some(r.id),
                PointTransactionKind::Redeem,
                -r.points_redeemed,
                r.created_at,
            )
            .await?;
        }

        let query = format!(
            r#"
            INSERT INTO reservations ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS, RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(r.id)
            .bind(r.salon_id)
            .bind(r.customer_id)
            .bind(r.staff_id)
            .bind(r.menu_id)
            .bind(&r.option_ids)
            .bind(r.starts_at)
            .bind(r.ends_at)
            .bind(r.local_date)
            .bind(r.status)
            .bind(r.coupon_id)
            .bind(r.subtotal)
            .bind(r.staff_premium)
            .bind(r.coupon_discount)
            .bind(r.points_redeemed)
            .bind(r.total_price)
            .bind(r.created_at)
            .bind(r.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(code) = auth_code {
            sqlx::query(
                r#"
                INSERT INTO point_auth_codes (id, reservation_id, customer_id, code, points, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(code.id)
            .bind(code.reservation_id)
            .bind(code.customer_id)
            .bind(&code.code)
            .bind(code.points)
            .bind(code.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO point_accrual_tasks (id, reservation_id, customer_id, points, scheduled_for, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(accrual.id)
        .bind(accrual.reservation_id)
        .bind(accrual.customer_id)
        .bind(accrual.points)
        .bind(accrual.scheduled_for)
        .bind(accrual.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn release_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<ReleasedBooking> {
        let mut tx = self.pool.begin().await?;

        lock_reservation(&mut *tx, id, expected).await?;

        let query = format!(
            "UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(status)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        let auth_code_deleted = sqlx::query("DELETE FROM point_auth_codes WHERE reservation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let accrual_deleted =
            sqlx::query("DELETE FROM point_accrual_tasks WHERE reservation_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;

        let points_credited = reservation.points_redeemed;
        if points_credited > 0 {
            post_points(
                &mut *tx,
                reservation.customer_id,
                Some(id),
                PointTransactionKind::Refund,
                points_credited,
                now,
            )
            .await?;
        }

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        lock_reservation(&mut *tx, id, expected).await?;

        let query = format!(
            "UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(ReservationStatus::Completed)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM point_auth_codes WHERE reservation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn reschedule_booking(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        window: RescheduledWindow,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        let current = lock_reservation(&mut *tx, id, expected).await?;
        lock_staff_day(&mut *tx, current.staff_id, window.local_date).await?;

        if has_overlap(
            &mut *tx,
            current.staff_id,
            window.starts_at,
            window.ends_at,
            Some(id),
        )
        .await?
        {
            return Err(BookingError::conflict(format!(
                "staff {} already has a reservation overlapping {}",
                current.staff_id, window.starts_at
            )));
        }

        let query = format!(
            r#"
            UPDATE reservations
            SET starts_at = $2, ends_at = $3, local_date = $4, updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(window.starts_at)
            .bind(window.ends_at)
            .bind(window.local_date)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE point_auth_codes SET expires_at = $2 WHERE reservation_id = $1")
            .bind(id)
            .bind(window.auth_code_expires_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE point_accrual_tasks SET scheduled_for = $2 WHERE reservation_id = $1")
            .bind(id)
            .bind(window.accrual_scheduled_for)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reservation)
    }
}

#[async_trait]
impl PointStore for PgStore {
    async fn point_balance(&self, customer_id: CustomerId) -> BookingResult<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM point_balances WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(balance.unwrap_or(0))
    }

    async fn auth_code_for(
        &self,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<PointAuthCode>> {
        let code = sqlx::query_as::<_, PointAuthCode>(
            r#"
            SELECT id, reservation_id, customer_id, code, points, expires_at
            FROM point_auth_codes
            WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    async fn consume_auth_code(&self, auth_code_id: Uuid) -> BookingResult<bool> {
        let result = sqlx::query("DELETE FROM point_auth_codes WHERE id = $1")
            .bind(auth_code_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn accrual_task_for(
        &self,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<PointAccrualTask>> {
        let task = sqlx::query_as::<_, PointAccrualTask>(
            r#"
            SELECT id, reservation_id, customer_id, points, scheduled_for, created_at
            FROM point_accrual_tasks
            WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn due_accrual_tasks(&self, now: DateTime<Utc>) -> BookingResult<Vec<PointAccrualTask>> {
        let tasks = sqlx::query_as::<_, PointAccrualTask>(
            r#"
            SELECT id, reservation_id, customer_id, points, scheduled_for, created_at
            FROM point_accrual_tasks
            WHERE scheduled_for <= $1
            ORDER BY scheduled_for, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn apply_accrual(
        &self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<AccrualOutcome> {
        let mut tx = self.pool.begin().await?;

        // Locking the task row claims it; a concurrent sweep waits and then
        // finds it deleted
        let task = sqlx::query_as::<_, PointAccrualTask>(
            r#"
            SELECT id, reservation_id, customer_id, points, scheduled_for, created_at
            FROM point_accrual_tasks
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(task) = task else {
            return Ok(AccrualOutcome::Missing);
        };

        let status = sqlx::query_scalar::<_, ReservationStatus>(
            "SELECT status FROM reservations WHERE id = $1 FOR SHARE",
        )
        .bind(task.reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let credit = match status {
            Some(ReservationStatus::Completed) => true,
            Some(ReservationStatus::Pending | ReservationStatus::Confirmed) => {
                return Ok(AccrualOutcome::Deferred);
            }
            _ => false,
        };

        sqlx::query("DELETE FROM point_accrual_tasks WHERE id = $1")
            .bind(task.id)
            .execute(&mut *tx)
            .await?;

        if !credit {
            tx.commit().await?;
            tracing::debug!(task_id = %task.id, "Dropped accrual task of unserved reservation");
            return Ok(AccrualOutcome::Dropped);
        }

        post_points(
            &mut *tx,
            task.customer_id,
            Some(task.reservation_id),
            PointTransactionKind::Accrual,
            task.points,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(AccrualOutcome::Credited)
    }

    async fn purge_expired_auth_codes(&self, now: DateTime<Utc>) -> BookingResult<u64> {
        let result = sqlx::query("DELETE FROM point_auth_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn point_transactions(
        &self,
        customer_id: CustomerId,
    ) -> BookingResult<Vec<PointTransaction>> {
        let transactions = sqlx::query_as::<_, PointTransaction>(
            r#"
            SELECT id, customer_id, reservation_id, kind, delta, balance_after, created_at
            FROM point_transactions
            WHERE customer_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}
