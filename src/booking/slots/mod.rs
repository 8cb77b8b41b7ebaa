// Slot Allocator
//
// Turns a staff member's working-hours template, dated exceptions and booked
// windows into the free intervals of one salon-local day, then lists every
// aligned start time that can host a service of the requested length.
// Snapshots are built lazily and memoized per (staff, date).

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::sync::Arc;

use crate::booking::error::{BookingError, BookingResult};
use crate::booking::metrics::PerformanceMetrics;
use crate::booking::models::{SalonSettings, ScheduleException, WorkingHoursRule};
use crate::booking::store::AvailabilityStore;
use crate::booking::types::{ReservationId, SalonId, StaffId};

pub mod cache;

pub use cache::{SnapshotCache, SnapshotKey};

pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Half-open range `[start, end)` of minutes from local midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MinuteInterval {
    pub start: i32,
    pub end: i32,
}

impl MinuteInterval {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> i32 {
        (self.end - self.start).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `[start, start + minutes)` lies entirely inside this interval
    pub fn fits(&self, start: i32, minutes: i32) -> bool {
        start >= self.start && start + minutes <= self.end
    }

    pub fn overlaps(&self, other: &MinuteInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Remove every busy interval from `open`, yielding sorted disjoint free intervals
pub fn subtract_intervals(open: MinuteInterval, busy: &[MinuteInterval]) -> Vec<MinuteInterval> {
    let mut busy: Vec<MinuteInterval> = busy.iter().filter(|b| !b.is_empty()).copied().collect();
    busy.sort();

    let mut free = Vec::new();
    let mut cursor = open.start;

    for interval in busy {
        if cursor >= open.end || interval.start >= open.end {
            break;
        }
        if interval.end <= cursor {
            continue;
        }
        if interval.start > cursor {
            free.push(MinuteInterval::new(cursor, interval.start));
        }
        cursor = cursor.max(interval.end);
    }

    if cursor < open.end {
        free.push(MinuteInterval::new(cursor, open.end));
    }
    free
}

/// Start minutes aligned to `granularity` (counted from midnight) at which
/// `required` minutes fit entirely inside one free interval
pub fn candidate_starts(free: &[MinuteInterval], required: i32, granularity: i32) -> Vec<i32> {
    let mut starts = Vec::new();
    let within_day = 1..=MINUTES_PER_DAY;
    if !within_day.contains(&required) || !within_day.contains(&granularity) {
        return starts;
    }

    for interval in free {
        let mut start = (interval.start + granularity - 1).div_euclid(granularity) * granularity;
        while interval.fits(start, required) {
            starts.push(start);
            start += granularity;
        }
    }
    starts
}

/// Minutes since midnight of a wall-clock time
pub fn minute_of(time: NaiveTime) -> i32 {
    (time.num_seconds_from_midnight() / 60) as i32
}

/// Wall-clock time of a minute offset; `None` past the end of the day
pub fn time_of(minute: i32) -> Option<NaiveTime> {
    if !(0..MINUTES_PER_DAY).contains(&minute) {
        return None;
    }
    NaiveTime::from_num_seconds_from_midnight_opt(minute as u32 * 60, 0)
}

/// Open interval for a staff member on one date
///
/// Precedence: staff exception, salon exception, staff weekday rule, salon
/// weekday rule. A closed entry or an overnight range means no open time.
pub fn resolve_open_interval(
    staff_id: StaffId,
    rules: &[WorkingHoursRule],
    exceptions: &[ScheduleException],
) -> Option<MinuteInterval> {
    let exception = exceptions
        .iter()
        .find(|e| e.staff_id == Some(staff_id))
        .or_else(|| exceptions.iter().find(|e| e.staff_id.is_none()));

    if let Some(exception) = exception {
        if exception.is_closed {
            return None;
        }
        return match (exception.opens_at, exception.closes_at) {
            (Some(opens_at), Some(closes_at)) => day_range(opens_at, closes_at),
            _ => None,
        };
    }

    let rule = rules
        .iter()
        .find(|r| r.staff_id == Some(staff_id))
        .or_else(|| rules.iter().find(|r| r.staff_id.is_none()))?;

    if !rule.is_open {
        return None;
    }
    day_range(rule.opens_at, rule.closes_at)
}

fn day_range(opens_at: NaiveTime, closes_at: NaiveTime) -> Option<MinuteInterval> {
    let interval = MinuteInterval::new(minute_of(opens_at), minute_of(closes_at));
    (!interval.is_empty()).then_some(interval)
}

/// Converts between UTC instants and a salon's local wall clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalonCalendar {
    utc_offset_minutes: i32,
}

impl SalonCalendar {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self { utc_offset_minutes }
    }

    fn offset(&self) -> Duration {
        Duration::minutes(self.utc_offset_minutes as i64)
    }

    pub fn local_datetime(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc() + self.offset()
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(at).date()
    }

    /// UTC instant of a local wall-clock moment
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        (local - self.offset()).and_utc()
    }

    /// UTC instant of `minute` minutes after local midnight of `date`
    pub fn instant(&self, date: NaiveDate, minute: i32) -> DateTime<Utc> {
        self.to_utc(date.and_time(NaiveTime::MIN) + Duration::minutes(minute as i64))
    }

    /// Minute offset of an instant within `date`, clipped to that day
    pub fn minute_of_day(&self, date: NaiveDate, at: DateTime<Utc>) -> i32 {
        let since_midnight = self.local_datetime(at) - date.and_time(NaiveTime::MIN);
        since_midnight.num_minutes().clamp(0, MINUTES_PER_DAY as i64) as i32
    }
}

impl From<&SalonSettings> for SalonCalendar {
    fn from(settings: &SalonSettings) -> Self {
        Self::new(settings.utc_offset_minutes)
    }
}

/// A booked window expressed in local minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedInterval {
    pub reservation_id: ReservationId,
    pub interval: MinuteInterval,
}

/// Derived availability of one staff member on one date
#[derive(Debug, Clone)]
pub struct AvailabilitySnapshot {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub granularity_minutes: i32,
    /// `None` when the staff member is closed that day
    pub open: Option<MinuteInterval>,
    pub booked: Vec<BookedInterval>,
}

impl AvailabilitySnapshot {
    /// Free intervals, optionally treating one reservation's window as free
    pub fn free_intervals(&self, ignore: Option<ReservationId>) -> Vec<MinuteInterval> {
        let Some(open) = self.open else {
            return Vec::new();
        };

        let busy: Vec<MinuteInterval> = self
            .booked
            .iter()
            .filter(|b| Some(b.reservation_id) != ignore)
            .map(|b| b.interval)
            .collect();
        subtract_intervals(open, &busy)
    }

    pub fn slots(&self, required_minutes: i32, ignore: Option<ReservationId>) -> Vec<NaiveTime> {
        candidate_starts(
            &self.free_intervals(ignore),
            required_minutes,
            self.granularity_minutes,
        )
        .into_iter()
        .filter_map(time_of)
        .collect()
    }
}

/// Slot Allocator
///
/// Pure read/compute over the availability store; safe to call concurrently
/// for different staff.
pub struct SlotAllocator {
    store: Arc<dyn AvailabilityStore>,
    cache: SnapshotCache,
    metrics: Option<PerformanceMetrics>,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn AvailabilityStore>, cache_ttl: std::time::Duration) -> Self {
        Self {
            store,
            cache: SnapshotCache::new(cache_ttl),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Scheduling settings of a salon, rejecting unusable granularities
    pub async fn salon_settings(&self, salon_id: SalonId) -> BookingResult<SalonSettings> {
        let settings = self
            .store
            .salon_settings(salon_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Salon", salon_id))?;

        if !(1..=MINUTES_PER_DAY).contains(&settings.slot_interval_minutes) {
            return Err(BookingError::InvalidArgument(format!(
                "salon {} has a slot interval of {} minutes, expected 1 to {}",
                salon_id, settings.slot_interval_minutes, MINUTES_PER_DAY
            )));
        }
        Ok(settings)
    }

    /// Fetch the cached snapshot or build it from the store
    pub async fn snapshot(
        &self,
        settings: &SalonSettings,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> BookingResult<Arc<AvailabilitySnapshot>> {
        let key = (staff_id, date);
        if let Some(snapshot) = self.cache.get(&key).await {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(snapshot);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let version = self.cache.version(&key).await;
        let day_of_week = WorkingHoursRule::day_index(date.weekday());

        let (rules, exceptions, windows) = tokio::try_join!(
            self.store
                .working_hours(settings.salon_id, staff_id, day_of_week),
            self.store
                .schedule_exceptions(settings.salon_id, staff_id, date),
            self.store.booked_windows(staff_id, date),
        )?;

        let calendar = SalonCalendar::from(settings);
        let booked = windows
            .iter()
            .map(|w| BookedInterval {
                reservation_id: w.reservation_id,
                interval: MinuteInterval::new(
                    calendar.minute_of_day(date, w.starts_at),
                    calendar.minute_of_day(date, w.ends_at),
                ),
            })
            .collect();

        let snapshot = Arc::new(AvailabilitySnapshot {
            staff_id,
            date,
            granularity_minutes: settings.slot_interval_minutes,
            open: resolve_open_interval(staff_id, &rules, &exceptions),
            booked,
        });

        tracing::debug!(
            staff_id,
            %date,
            booked = snapshot.booked.len(),
            "Built availability snapshot"
        );

        self.cache
            .insert_if_current(key, version, Arc::clone(&snapshot))
            .await;
        Ok(snapshot)
    }

    /// Aligned start times on `date` where `required_minutes` fit and which
    /// are still ahead of `now`
    pub async fn free_slots(
        &self,
        settings: &SalonSettings,
        staff_id: StaffId,
        date: NaiveDate,
        required_minutes: i32,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<NaiveTime>> {
        self.compute_slots(settings, staff_id, date, required_minutes, None, now)
            .await
    }

    /// Like `free_slots`, but the given reservation's own window counts as free
    pub async fn free_slots_excluding(
        &self,
        settings: &SalonSettings,
        staff_id: StaffId,
        date: NaiveDate,
        required_minutes: i32,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<NaiveTime>> {
        self.compute_slots(
            settings,
            staff_id,
            date,
            required_minutes,
            Some(reservation_id),
            now,
        )
        .await
    }

    async fn compute_slots(
        &self,
        settings: &SalonSettings,
        staff_id: StaffId,
        date: NaiveDate,
        required_minutes: i32,
        ignore: Option<ReservationId>,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<NaiveTime>> {
        if required_minutes <= 0 {
            return Err(BookingError::InvalidArgument(format!(
                "required duration must be positive, got {} minutes",
                required_minutes
            )));
        }

        let _timer = self.metrics.as_ref().map(|m| m.start_slot_computation());
        let snapshot = self.snapshot(settings, staff_id, date).await?;
        let calendar = SalonCalendar::from(settings);
        Ok(snapshot
            .slots(required_minutes, ignore)
            .into_iter()
            .filter(|start| calendar.instant(date, minute_of(*start)) > now)
            .collect())
    }

    /// Drop the cached snapshot for one (staff, date)
    pub async fn invalidate(&self, staff_id: StaffId, date: NaiveDate) {
        self.cache.invalidate((staff_id, date)).await;
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn interval_strategy() -> impl Strategy<Value = MinuteInterval> {
        (0..MINUTES_PER_DAY, 1..240i32)
            .prop_map(|(start, len)| MinuteInterval::new(start, (start + len).min(MINUTES_PER_DAY)))
    }

    proptest! {
        /// Property 1: Free intervals are disjoint, sorted, inside the open range
        /// and never overlap a busy interval
        #[test]
        fn prop_free_intervals_are_disjoint_and_clear(
            open in interval_strategy(),
            busy in prop::collection::vec(interval_strategy(), 0..8),
        ) {
            let free = subtract_intervals(open, &busy);

            for pair in free.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
            for interval in &free {
                prop_assert!(!interval.is_empty());
                prop_assert!(interval.start >= open.start && interval.end <= open.end);
                for b in busy.iter().filter(|b| !b.is_empty()) {
                    prop_assert!(!interval.overlaps(b));
                }
            }
        }

        /// Property 2: Every candidate start is aligned and fits in one free interval
        #[test]
        fn prop_candidate_starts_fit(
            open in interval_strategy(),
            busy in prop::collection::vec(interval_strategy(), 0..8),
            required in 1..180i32,
            granularity in prop::sample::select(vec![5, 10, 15, 20, 30, 60]),
        ) {
            let free = subtract_intervals(open, &busy);
            let starts = candidate_starts(&free, required, granularity);

            for start in starts {
                prop_assert_eq!(start % granularity, 0);
                prop_assert!(free.iter().any(|f| f.fits(start, required)));
                let window = MinuteInterval::new(start, start + required);
                for b in busy.iter().filter(|b| !b.is_empty()) {
                    prop_assert!(!window.overlaps(b));
                }
            }
        }
    }
}
