// Performance Metrics for the booking core
//
// Tracks slot-snapshot cache effectiveness, timings of the hot operations and
// booking outcomes so slow paths and contention show up in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Performance threshold for slow operations (100ms)
const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Count, cumulative time and slow count for one kind of operation
#[derive(Debug, Default)]
struct OperationStats {
    count: AtomicU64,
    total_time_us: AtomicU64,
    slow: AtomicU64,
}

impl OperationStats {
    fn record(&self, label: &str, duration: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS {
            self.slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow {}: {}ms", label, duration.as_millis());
        }
    }

    fn avg_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    // Slot snapshot cache
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,

    // Timed operations
    slot_computations: OperationStats,
    pricing_calculations: OperationStats,
    booking_commits: OperationStats,

    // Outcomes
    bookings_confirmed: AtomicU64,
    booking_conflicts: AtomicU64,
    bookings_released: AtomicU64,
    accruals_processed: AtomicU64,
    accruals_failed: AtomicU64,
}

/// Performance metrics for the booking core
///
/// Cheap to clone; every clone shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    inner: Arc<MetricsInner>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn start_slot_computation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::SlotComputation, self.clone())
    }

    pub fn start_pricing_calculation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Pricing, self.clone())
    }

    pub fn start_booking_commit(&self) -> OperationTimer {
        OperationTimer::new(OperationType::BookingCommit, self.clone())
    }

    pub fn record_booking_confirmed(&self) {
        self.inner.bookings_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_booking_conflict(&self) {
        self.inner.booking_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Cancellation or refund
    pub fn record_booking_released(&self) {
        self.inner.bookings_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accrual_processed(&self) {
        self.inner.accruals_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accrual_failed(&self) {
        self.inner.accruals_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, operation_type: OperationType, duration: Duration) {
        match operation_type {
            OperationType::SlotComputation => self
                .inner
                .slot_computations
                .record("slot computation", duration),
            OperationType::Pricing => self
                .inner
                .pricing_calculations
                .record("pricing calculation", duration),
            OperationType::BookingCommit => self
                .inner
                .booking_commits
                .record("booking commit", duration),
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let inner = &self.inner;
        MetricsSummary {
            cache_hit_rate: self.cache_hit_rate(),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: inner.cache_misses.load(Ordering::Relaxed),
            slot_computations: inner.slot_computations.count.load(Ordering::Relaxed),
            avg_slot_computation_ms: inner.slot_computations.avg_ms(),
            slow_slot_computations: inner.slot_computations.slow.load(Ordering::Relaxed),
            pricing_calculations: inner.pricing_calculations.count.load(Ordering::Relaxed),
            avg_pricing_time_ms: inner.pricing_calculations.avg_ms(),
            slow_pricing_calculations: inner.pricing_calculations.slow.load(Ordering::Relaxed),
            booking_commits: inner.booking_commits.count.load(Ordering::Relaxed),
            avg_booking_commit_ms: inner.booking_commits.avg_ms(),
            slow_booking_commits: inner.booking_commits.slow.load(Ordering::Relaxed),
            bookings_confirmed: inner.bookings_confirmed.load(Ordering::Relaxed),
            booking_conflicts: inner.booking_conflicts.load(Ordering::Relaxed),
            bookings_released: inner.bookings_released.load(Ordering::Relaxed),
            accruals_processed: inner.accruals_processed.load(Ordering::Relaxed),
            accruals_failed: inner.accruals_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Booking Performance Metrics:\n\
             Cache: {:.1}% hit rate ({} hits, {} misses)\n\
             Slots: {} computations, avg {:.2}ms, {} slow\n\
             Pricing: {} calculations, avg {:.2}ms, {} slow\n\
             Commits: {} attempts, avg {:.2}ms, {} slow\n\
             Bookings: {} confirmed, {} conflicts, {} released\n\
             Accruals: {} processed, {} failed",
            summary.cache_hit_rate * 100.0,
            summary.cache_hits,
            summary.cache_misses,
            summary.slot_computations,
            summary.avg_slot_computation_ms,
            summary.slow_slot_computations,
            summary.pricing_calculations,
            summary.avg_pricing_time_ms,
            summary.slow_pricing_calculations,
            summary.booking_commits,
            summary.avg_booking_commit_ms,
            summary.slow_booking_commits,
            summary.bookings_confirmed,
            summary.booking_conflicts,
            summary.bookings_released,
            summary.accruals_processed,
            summary.accruals_failed,
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum OperationType {
    SlotComputation,
    Pricing,
    BookingCommit,
}

/// Timer for tracking operation duration; records when dropped
pub struct OperationTimer {
    start: Instant,
    operation_type: OperationType,
    metrics: PerformanceMetrics,
}

impl OperationTimer {
    fn new(operation_type: OperationType, metrics: PerformanceMetrics) -> Self {
        Self {
            start: Instant::now(),
            operation_type,
            metrics,
        }
    }

    /// Stop the timer now instead of at end of scope
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics
            .record(self.operation_type, self.start.elapsed());
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cache_hit_rate: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub slot_computations: u64,
    pub avg_slot_computation_ms: f64,
    pub slow_slot_computations: u64,
    pub pricing_calculations: u64,
    pub avg_pricing_time_ms: f64,
    pub slow_pricing_calculations: u64,
    pub booking_commits: u64,
    pub avg_booking_commit_ms: f64,
    pub slow_booking_commits: u64,
    pub bookings_confirmed: u64,
    pub booking_conflicts: u64,
    pub bookings_released: u64,
    pub accruals_processed: u64,
    pub accruals_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = PerformanceMetrics::new();
        assert_eq!(metrics.cache_hit_rate(), 0.0);
        assert_eq!(metrics.summary().avg_slot_computation_ms, 0.0);
    }

    #[test]
    fn test_cache_metrics() {
        let metrics = PerformanceMetrics::new();

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        assert_eq!(metrics.cache_hit_rate(), 2.0 / 3.0);
    }

    #[test]
    fn test_completed_timer_records_once() {
        let metrics = PerformanceMetrics::new();

        let timer = metrics.start_slot_computation();
        thread::sleep(Duration::from_millis(10));
        timer.complete();

        let summary = metrics.summary();
        assert_eq!(summary.slot_computations, 1);
        assert!(summary.avg_slot_computation_ms >= 10.0);
    }

    #[test]
    fn test_slow_operation_detection() {
        let metrics = PerformanceMetrics::new();

        {
            let _timer = metrics.start_pricing_calculation();
            thread::sleep(Duration::from_millis(150));
        }

        let summary = metrics.summary();
        assert_eq!(summary.slow_pricing_calculations, 1);
        assert_eq!(summary.slow_slot_computations, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = PerformanceMetrics::new();
        let clone = metrics.clone();

        clone.record_booking_confirmed();
        clone.record_booking_conflict();
        metrics.record_accrual_processed();

        let summary = metrics.summary();
        assert_eq!(summary.bookings_confirmed, 1);
        assert_eq!(summary.booking_conflicts, 1);
        assert_eq!(summary.accruals_processed, 1);
    }
}
