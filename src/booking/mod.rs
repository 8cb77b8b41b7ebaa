// Booking Core Module
//
// Reservation scheduling and pricing for salons:
// - Slot allocation: free start times per staff member and date
// - Staff selection: priority-based auto-assignment
// - Pricing: menu, options, staff premium, coupon and point redemption
// - Point ledger: deferred accrual and one-time redemption codes
//
// The BookingCoordinator below is the only component that writes. Every write
// goes through one store unit of work and then invalidates the affected
// (staff, date) availability snapshots.

pub mod coupon;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod points;
pub mod pricing;
pub mod slots;
pub mod staff;
pub mod status_machine;
pub mod store;
pub mod types;


pub use coupon::{AppliedCoupon, CouponValidator};
pub use error::{BookingError, BookingResult, CouponRejection, ErrorResponse};
pub use metrics::{MetricsSummary, PerformanceMetrics};
pub use models::{
    AvailableSlots, BookingConfirmation, BookingQuote, CreateBookingRequest, MaintenanceReport,
    RedeemAuthCodeRequest, RescheduleRequest, Reservation, SlotQuery,
};
pub use notify::{Notifier, TracingNotifier};
pub use points::{PointLedger, PointPolicy, SweepReport};
pub use pricing::{PriceBreakdown, PricingEngine, PricingRequest};
pub use slots::{SalonCalendar, SlotAllocator};
pub use staff::StaffSelector;
pub use status_machine::StatusMachine;
pub use store::{BookingStore, InMemoryStore, PgStore};
pub use types::{DiscountType, Lifecycle, ReservationId, ReservationStatus};

// Booking Coordinator
//
// Ties the engines together and owns every state change of a reservation.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use mockable::Clock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::booking::models::{Menu, MenuOption, SalonSettings, StaffMember};
use crate::booking::staff::is_qualified;
use crate::booking::store::{
    CatalogRepository, NewBooking, ReleasedBooking, RescheduledWindow, ReservationRepository,
};
use crate::booking::types::{OptionId, SalonId, StaffId};
use crate::config::Config;

/// Construction parameters of a [`BookingCoordinator`]
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub snapshot_cache_ttl: std::time::Duration,
    pub point_policy: PointPolicy,
    /// How long archived catalog rows are kept before the maintenance sweep deletes them
    pub archive_retention: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            snapshot_cache_ttl: config.snapshot_cache_ttl,
            point_policy: config.point_policy(),
            archive_retention: config.archive_retention(),
        }
    }
}

/// Everything resolved for a booking before anything is written
struct BookingPlan {
    settings: SalonSettings,
    staff: StaffMember,
    required_minutes: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    price: PriceBreakdown,
}

/// Total duration of a menu and every option occurrence
fn required_minutes(menu: &Menu, options: &[MenuOption]) -> i32 {
    menu.duration_minutes + options.iter().map(|o| o.duration_minutes).sum::<i32>()
}

pub struct BookingCoordinator {
    catalog: Arc<dyn CatalogRepository>,
    reservations: Arc<dyn ReservationRepository>,
    slots: Arc<SlotAllocator>,
    staff: StaffSelector,
    pricing: PricingEngine,
    points: Arc<PointLedger>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    metrics: PerformanceMetrics,
    archive_retention: Duration,
}

impl BookingCoordinator {
    /// Wire every engine over one store adapter
    pub fn new<S>(
        store: Arc<S>,
        settings: CoordinatorSettings,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: BookingStore + 'static,
    {
        let metrics = PerformanceMetrics::new();

        let slots = Arc::new(
            SlotAllocator::new(store.clone(), settings.snapshot_cache_ttl)
                .with_metrics(metrics.clone()),
        );
        let points = Arc::new(
            PointLedger::new(store.clone(), settings.point_policy).with_metrics(metrics.clone()),
        );
        let coupons = Arc::new(CouponValidator::new(store.clone()));

        Self {
            catalog: store.clone(),
            reservations: store.clone(),
            staff: StaffSelector::new(store, slots.clone()),
            pricing: PricingEngine::new(coupons, points.clone()).with_metrics(metrics.clone()),
            slots,
            points,
            notifier,
            clock,
            metrics,
            archive_retention: settings.archive_retention,
        }
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn slot_allocator(&self) -> &SlotAllocator {
        &self.slots
    }

    pub fn point_ledger(&self) -> &PointLedger {
        &self.points
    }

    // ------------------------------------------------------------------
    // Catalog lookups: archived or foreign-salon rows count as absent
    // ------------------------------------------------------------------

    async fn active_menu(&self, salon_id: SalonId, menu_id: i64) -> BookingResult<Menu> {
        self.catalog
            .menu(menu_id)
            .await?
            .filter(|m| m.salon_id == salon_id && m.lifecycle().is_active())
            .ok_or_else(|| BookingError::not_found("Menu", menu_id))
    }

    /// Options in request order, repeats included
    async fn active_options(
        &self,
        salon_id: SalonId,
        option_ids: &[OptionId],
    ) -> BookingResult<Vec<MenuOption>> {
        if option_ids.is_empty() {
            return Ok(Vec::new());
        }

        let distinct: Vec<OptionId> = option_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let by_id: HashMap<OptionId, MenuOption> = self
            .catalog
            .menu_options(&distinct)
            .await?
            .into_iter()
            .filter(|o| o.salon_id == salon_id && o.lifecycle().is_active())
            .map(|o| (o.id, o))
            .collect();

        option_ids
            .iter()
            .map(|id| {
                by_id
                    .get(id)
                    .cloned()
                    .ok_or_else(|| BookingError::not_found("MenuOption", id))
            })
            .collect()
    }

    async fn active_staff(&self, salon_id: SalonId, staff_id: StaffId) -> BookingResult<StaffMember> {
        self.catalog
            .staff_member(staff_id)
            .await?
            .filter(|s| s.salon_id == salon_id && s.lifecycle().is_active())
            .ok_or_else(|| BookingError::not_found("Staff", staff_id))
    }

    async fn reservation(&self, reservation_id: ReservationId) -> BookingResult<Reservation> {
        self.reservations
            .reservation(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Reservation", reservation_id))
    }

    /// Free slots of a named staff member; never falls back to another staff member
    async fn named_staff_slots(
        &self,
        settings: &SalonSettings,
        staff: &StaffMember,
        menu: &Menu,
        options: &[MenuOption],
        date: NaiveDate,
        required_minutes: i32,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<NaiveTime>> {
        if !is_qualified(staff, menu, options) {
            return Err(BookingError::no_availability(format!(
                "staff {} does not perform menu {} with the requested options",
                staff.id, menu.id
            )));
        }

        let slots = self
            .slots
            .free_slots(settings, staff.id, date, required_minutes, now)
            .await?;
        if slots.is_empty() {
            return Err(BookingError::no_availability(format!(
                "staff {} has no free slot on {}",
                staff.id, date
            )));
        }
        Ok(slots)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Bookable start times for a menu and option set on one date.
    ///
    /// Without a named staff member the result is the union of the slots of
    /// every qualified staff member. Starts that have already begun are left out.
    pub async fn get_available_slots(&self, query: SlotQuery) -> BookingResult<AvailableSlots> {
        query.validate()?;
        let now = self.clock.utc();

        let settings = self.slots.salon_settings(query.salon_id).await?;
        let menu = self.active_menu(query.salon_id, query.menu_id).await?;
        let options = self.active_options(query.salon_id, &query.option_ids).await?;
        let required = required_minutes(&menu, &options);

        let slots = match query.staff_id {
            Some(staff_id) => {
                let staff = self.active_staff(query.salon_id, staff_id).await?;
                self.named_staff_slots(
                    &settings,
                    &staff,
                    &menu,
                    &options,
                    query.date,
                    required,
                    now,
                )
                .await?
            }
            None => {
                let union: BTreeSet<NaiveTime> = self
                    .staff
                    .available_staff(&settings, &menu, &options, query.date, required, now)
                    .await?
                    .into_iter()
                    .flat_map(|a| a.slots)
                    .collect();
                if union.is_empty() {
                    return Err(BookingError::no_availability(format!(
                        "no staff member can take menu {} on {}",
                        menu.id, query.date
                    )));
                }
                union.into_iter().collect()
            }
        };

        Ok(AvailableSlots {
            date: query.date,
            staff_id: query.staff_id,
            required_minutes: required,
            slots,
        })
    }

    /// Resolve staff, window and price without writing anything
    async fn plan(&self, request: &CreateBookingRequest, now: DateTime<Utc>) -> BookingResult<BookingPlan> {
        let settings = self.slots.salon_settings(request.salon_id).await?;
        let menu = self.active_menu(request.salon_id, request.menu_id).await?;
        let options = self.active_options(request.salon_id, &request.option_ids).await?;
        let required = required_minutes(&menu, &options);

        let calendar = SalonCalendar::from(&settings);
        let starts_at = calendar.instant(request.date, slots::minute_of(request.slot_start));
        let ends_at = starts_at + Duration::minutes(required as i64);
        if starts_at <= now {
            return Err(BookingError::InvalidArgument(format!(
                "slot {} on {} has already started",
                request.slot_start.format("%H:%M"),
                request.date
            )));
        }

        let (staff, staff_premium) = match request.staff_id {
            Some(staff_id) => {
                let staff = self.active_staff(request.salon_id, staff_id).await?;
                let slots = self
                    .named_staff_slots(
                        &settings,
                        &staff,
                        &menu,
                        &options,
                        request.date,
                        required,
                        now,
                    )
                    .await?;
                if !slots.contains(&request.slot_start) {
                    return Err(BookingError::no_availability(format!(
                        "staff {} is not free at {} on {}",
                        staff_id,
                        request.slot_start.format("%H:%M"),
                        request.date
                    )));
                }
                let premium = staff.extra_charge;
                (staff, premium)
            }
            None => {
                let staff = self
                    .staff
                    .pick_staff_for_slot(
                        &settings,
                        &menu,
                        &options,
                        request.date,
                        required,
                        request.slot_start,
                        now,
                    )
                    .await?;
                (staff, 0)
            }
        };

        let price = self
            .pricing
            .price(PricingRequest {
                salon_id: request.salon_id,
                customer_id: request.customer_id,
                menu: &menu,
                options: &options,
                staff_premium,
                points_requested: request.points_requested,
                coupon_code: request.coupon_code.as_deref(),
                now,
            })
            .await?;

        Ok(BookingPlan {
            settings,
            staff,
            required_minutes: required,
            starts_at,
            ends_at,
            price,
        })
    }

    /// Price a booking as `create_booking` would, without booking it.
    /// An inapplicable coupon is reported in the breakdown instead of failing.
    pub async fn quote_booking(&self, request: CreateBookingRequest) -> BookingResult<BookingQuote> {
        request.validate()?;
        let plan = self.plan(&request, self.clock.utc()).await?;

        Ok(BookingQuote {
            staff_id: plan.staff.id,
            starts_at: plan.starts_at,
            ends_at: plan.ends_at,
            required_minutes: plan.required_minutes,
            price: plan.price,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a confirmed reservation.
    ///
    /// The reservation, the point debit, the coupon use, the auth code and
    /// the accrual task land in one unit of work. Losing the race for the
    /// window yields `Conflict`; the caller should re-query availability.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> BookingResult<BookingConfirmation> {
        request.validate()?;
        let now = self.clock.utc();
        let plan = self.plan(&request, now).await?;

        // A coupon the customer typed must apply, or the booking is refused
        if let Some(rejection) = plan.price.coupon_rejection.clone() {
            return Err(rejection.into());
        }

        let price = &plan.price;
        self.points
            .reserve_redemption(request.customer_id, price.points_applied)
            .await?;

        let reservation_id = Uuid::new_v4();
        let calendar = SalonCalendar::from(&plan.settings);

        let auth_code = (price.points_applied > 0).then(|| {
            self.points.issue_auth_code(
                reservation_id,
                request.customer_id,
                price.points_applied,
                plan.ends_at,
            )
        });
        let accrual = self.points.schedule_accrual(
            reservation_id,
            request.customer_id,
            self.points.accrual_points(price.final_price),
            calendar,
            request.date,
            now,
        )?;

        let reservation = Reservation {
            id: reservation_id,
            salon_id: request.salon_id,
            customer_id: request.customer_id,
            staff_id: plan.staff.id,
            menu_id: request.menu_id,
            option_ids: request.option_ids.clone(),
            starts_at: plan.starts_at,
            ends_at: plan.ends_at,
            local_date: request.date,
            status: ReservationStatus::Confirmed,
            coupon_id: price.coupon_id,
            subtotal: price.subtotal,
            staff_premium: price.staff_premium,
            coupon_discount: price.coupon_discount,
            points_redeemed: price.points_applied,
            total_price: price.final_price,
            created_at: now,
            updated_at: now,
        };

        let timer = self.metrics.start_booking_commit();
        let committed = self
            .reservations
            .commit_booking(NewBooking {
                reservation,
                auth_code: auth_code.clone(),
                accrual,
            })
            .await;
        timer.complete();

        let reservation = match committed {
            Ok(reservation) => reservation,
            Err(e) => {
                if matches!(e, BookingError::Conflict { .. }) {
                    self.metrics.record_booking_conflict();
                    tracing::warn!(
                        staff_id = plan.staff.id,
                        date = %request.date,
                        slot = %request.slot_start,
                        "Booking lost the race for its window"
                    );
                }
                return Err(e);
            }
        };

        self.slots
            .invalidate(reservation.staff_id, reservation.local_date)
            .await;
        self.metrics.record_booking_confirmed();

        tracing::info!(
            reservation_id = %reservation.id,
            customer_id = reservation.customer_id,
            staff_id = reservation.staff_id,
            final_price = reservation.total_price,
            points_redeemed = reservation.points_redeemed,
            "Booking confirmed"
        );

        if let Some(code) = &auth_code {
            if let Err(e) = self
                .notifier
                .deliver_auth_code(reservation.customer_id, reservation.id, &code.code)
                .await
            {
                tracing::warn!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "Failed to deliver point authorization code"
                );
            }
        }

        Ok(BookingConfirmation {
            reservation_id: reservation.id,
            staff_id: reservation.staff_id,
            starts_at: reservation.starts_at,
            ends_at: reservation.ends_at,
            final_price: reservation.total_price,
            points_applied: reservation.points_redeemed,
            coupon_discount: reservation.coupon_discount,
            auth_code: auth_code.map(|c| c.code),
        })
    }

    /// Release a reservation's window and point artifacts, moving it to `target`
    async fn release(
        &self,
        reservation_id: ReservationId,
        target: ReservationStatus,
    ) -> BookingResult<ReleasedBooking> {
        let current = self.reservation(reservation_id).await?;
        StatusMachine::transition_once(current.status, target)?;

        let released = self
            .reservations
            .release_booking(reservation_id, current.status, target, self.clock.utc())
            .await?;

        self.slots
            .invalidate(released.reservation.staff_id, released.reservation.local_date)
            .await;
        self.metrics.record_booking_released();

        tracing::info!(
            %reservation_id,
            status = %target,
            points_credited = released.points_credited,
            auth_code_deleted = released.auth_code_deleted,
            accrual_deleted = released.accrual_deleted,
            "Booking released"
        );
        Ok(released)
    }

    /// Cancel a pending or confirmed reservation, crediting back redeemed points
    pub async fn cancel_booking(&self, reservation_id: ReservationId) -> BookingResult<ReleasedBooking> {
        self.release(reservation_id, ReservationStatus::Cancelled).await
    }

    /// Refund a completed reservation; an accrual already credited is kept
    pub async fn refund_booking(&self, reservation_id: ReservationId) -> BookingResult<ReleasedBooking> {
        self.release(reservation_id, ReservationStatus::Refunded).await
    }

    /// Mark a confirmed reservation as served
    pub async fn complete_booking(&self, reservation_id: ReservationId) -> BookingResult<Reservation> {
        let current = self.reservation(reservation_id).await?;
        StatusMachine::transition_once(current.status, ReservationStatus::Completed)?;

        let reservation = self
            .reservations
            .complete_booking(reservation_id, current.status, self.clock.utc())
            .await?;

        tracing::info!(%reservation_id, "Booking completed");
        Ok(reservation)
    }

    /// Move a reservation to another start time with the same staff member and duration
    pub async fn reschedule_booking(&self, request: RescheduleRequest) -> BookingResult<Reservation> {
        request.validate()?;
        let now = self.clock.utc();
        let current = self.reservation(request.reservation_id).await?;

        if !matches!(
            current.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        ) {
            return Err(BookingError::InvalidArgument(format!(
                "reservation {} is {} and cannot be rescheduled",
                current.id, current.status
            )));
        }

        let settings = self.slots.salon_settings(current.salon_id).await?;
        let calendar = SalonCalendar::from(&settings);
        let required = (current.ends_at - current.starts_at).num_minutes() as i32;

        let starts_at = calendar.instant(request.date, slots::minute_of(request.slot_start));
        if starts_at <= now {
            return Err(BookingError::InvalidArgument(format!(
                "slot {} on {} has already started",
                request.slot_start.format("%H:%M"),
                request.date
            )));
        }

        let free = self
            .slots
            .free_slots_excluding(
                &settings,
                current.staff_id,
                request.date,
                required,
                current.id,
                now,
            )
            .await?;
        if !free.contains(&request.slot_start) {
            return Err(BookingError::no_availability(format!(
                "staff {} is not free at {} on {}",
                current.staff_id,
                request.slot_start.format("%H:%M"),
                request.date
            )));
        }

        let ends_at = starts_at + Duration::minutes(required as i64);

        let window = RescheduledWindow {
            starts_at,
            ends_at,
            local_date: request.date,
            auth_code_expires_at: self.points.auth_code_expiry(ends_at),
            accrual_scheduled_for: self.points.accrual_instant(calendar, request.date)?,
        };

        let moved = self
            .reservations
            .reschedule_booking(current.id, current.status, window, now)
            .await;
        let reservation = match moved {
            Ok(reservation) => reservation,
            Err(e) => {
                if matches!(e, BookingError::Conflict { .. }) {
                    self.metrics.record_booking_conflict();
                }
                return Err(e);
            }
        };

        self.slots.invalidate(current.staff_id, current.local_date).await;
        self.slots
            .invalidate(reservation.staff_id, reservation.local_date)
            .await;

        tracing::info!(
            reservation_id = %reservation.id,
            from = %current.starts_at,
            to = %reservation.starts_at,
            "Booking rescheduled"
        );
        Ok(reservation)
    }

    /// In-person confirmation of a point redemption
    pub async fn redeem_points_auth_code(&self, request: RedeemAuthCodeRequest) -> BookingResult<()> {
        request.validate()?;
        let reservation = self.reservation(request.reservation_id).await?;

        self.points
            .redeem_auth_code(
                reservation.id,
                &request.code,
                reservation.points_redeemed,
                self.clock.utc(),
            )
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Credit every accrual task due at `now`
    pub async fn run_accrual_sweep(&self, now: DateTime<Utc>) -> BookingResult<SweepReport> {
        self.points.run_accrual_sweep(now).await
    }

    /// Delete expired auth codes and catalog rows archived past retention
    pub async fn run_maintenance_sweep(&self, now: DateTime<Utc>) -> BookingResult<MaintenanceReport> {
        let expired_auth_codes = self.points.purge_expired_codes(now).await?;
        let purged_catalog_rows = self
            .catalog
            .purge_archived(now - self.archive_retention)
            .await?;

        tracing::info!(
            expired_auth_codes,
            purged_catalog_rows,
            "Maintenance sweep finished"
        );
        Ok(MaintenanceReport {
            expired_auth_codes,
            purged_catalog_rows,
        })
    }
}
