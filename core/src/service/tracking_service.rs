use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};

use crate::calibration::{calibrate_or_fallback, DisplayQuery};
use crate::model::calibration::Calibration;
use crate::model::sample::Sample;
use crate::repository::LedgerRepository;
use crate::scheduler::FlushScheduler;
use crate::time::{Bucket, Clock, SystemClock};
use crate::tracking::{to_physical, DistanceUnit, SharedAccumulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Calibrated,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was accumulated; the ledger was not touched.
    Skipped,
    Merged { bucket: Bucket, distance: f64 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushStats {
    pub flushes: u64,
    pub skipped: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub total_distance: f64,
}

struct Lifecycle {
    state: TrackerState,
    calibration: Option<Calibration>,
}

/// Owns the accumulator and drives the periodic merge into the ledger.
///
/// Lifecycle: `Uninitialized -> Calibrated -> Running -> Stopped`. Samples are
/// only counted while running. Stopping performs one last flush.
pub struct TrackingService<R: LedgerRepository> {
    repo: R,
    unit: DistanceUnit,
    clock: Box<dyn Clock>,
    max_consecutive_failures: u32,
    accumulator: SharedAccumulator,
    lifecycle: Mutex<Lifecycle>,
    // Held across load/merge/save so two flushes never interleave.
    store_lock: Mutex<()>,
    stats: Mutex<FlushStats>,
    scheduler: Mutex<Option<FlushScheduler>>,
}

impl<R: LedgerRepository + 'static> TrackingService<R> {
    pub fn new(repo: R, unit: DistanceUnit) -> Self {
        Self {
            repo,
            unit,
            clock: Box::new(SystemClock),
            max_consecutive_failures: crate::config::DEFAULT_MAX_CONSECUTIVE_FAILURES,
            accumulator: SharedAccumulator::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: TrackerState::Uninitialized,
                calibration: None,
            }),
            store_lock: Mutex::new(()),
            stats: Mutex::new(FlushStats::default()),
            scheduler: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn state(&self) -> TrackerState {
        lock(&self.lifecycle).state
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn stats(&self) -> FlushStats {
        lock(&self.stats).clone()
    }

    /// Pixels observed but not yet persisted.
    pub fn pending_pixels(&self) -> f64 {
        self.accumulator.pending_pixels()
    }

    /// Queries the display once and moves to `Calibrated`. Without a
    /// fallback density a failed query is returned and the service stays
    /// `Uninitialized`.
    pub fn calibrate(
        &self,
        query: &dyn DisplayQuery,
        fallback_ppi: Option<f64>,
    ) -> Result<Calibration> {
        let calibration = calibrate_or_fallback(query, fallback_ppi)?;
        self.calibrate_with(calibration)?;
        Ok(calibration)
    }

    /// Moves to `Calibrated` with an already known density.
    pub fn calibrate_with(&self, calibration: Calibration) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state != TrackerState::Uninitialized {
            bail!("Cannot calibrate a tracker in state {:?}", lifecycle.state);
        }
        lifecycle.calibration = Some(calibration);
        lifecycle.state = TrackerState::Calibrated;
        Ok(())
    }

    /// Starts counting samples and arms the flush scheduler. Must be called
    /// from within a tokio runtime.
    pub fn start(self: &Arc<Self>, interval: Duration) -> Result<()> {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.state != TrackerState::Calibrated {
                bail!("Cannot start a tracker in state {:?}", lifecycle.state);
            }
            lifecycle.state = TrackerState::Running;
        }

        let weak = Arc::downgrade(self);
        let scheduler = FlushScheduler::spawn(interval, move || {
            if let Some(service) = weak.upgrade() {
                service.scheduled_flush();
            }
        });
        *lock(&self.scheduler) = Some(scheduler);

        info!("tracking started, flushing every {}s", interval.as_secs_f64());
        Ok(())
    }

    /// Feeds one pointer position. Returns `false` if the sample was ignored,
    /// either because the tracker is not running or because it is not a
    /// finite position.
    pub fn observe(&self, x: f64, y: f64) -> bool {
        if self.state() != TrackerState::Running {
            return false;
        }
        self.accumulator.observe(Sample::new(x, y))
    }

    pub fn flush_now(&self) -> Result<FlushOutcome> {
        self.flush_at(self.clock.now())
    }

    /// Drains the accumulator and merges the distance into the bucket for
    /// `now`. On failure the drained pixels go back into the accumulator.
    pub fn flush_at(&self, now: DateTime<Local>) -> Result<FlushOutcome> {
        let calibration = {
            let lifecycle = lock(&self.lifecycle);
            if lifecycle.state != TrackerState::Running {
                bail!("Cannot flush a tracker in state {:?}", lifecycle.state);
            }
            lifecycle
                .calibration
                .ok_or_else(|| anyhow!("Running tracker has no calibration"))?
        };
        self.flush_with(calibration, now)
    }

    /// Stops the scheduler, then flushes whatever is still pending.
    ///
    /// The scheduler is joined before the state leaves `Running`, so no
    /// scheduled flush can observe a stopped tracker.
    pub async fn stop(self: &Arc<Self>) -> Result<FlushOutcome> {
        if self.state() != TrackerState::Running {
            bail!("Cannot stop a tracker in state {:?}", self.state());
        }

        let scheduler = lock(&self.scheduler).take();
        if let Some(mut scheduler) = scheduler {
            scheduler.stop().await?;
        }

        let calibration = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.state != TrackerState::Running {
                bail!("Cannot stop a tracker in state {:?}", lifecycle.state);
            }
            lifecycle.state = TrackerState::Stopped;
            lifecycle
                .calibration
                .ok_or_else(|| anyhow!("Running tracker has no calibration"))?
        };

        let outcome = self.flush_with(calibration, self.clock.now());
        let stats = self.stats();
        match &outcome {
            Ok(_) => info!(
                "tracking stopped after {} flushes, {:.4} {} recorded",
                stats.flushes,
                stats.total_distance,
                self.unit.symbol()
            ),
            Err(err) => error!(
                "final flush failed, {:.1} px not recorded: {:#}",
                self.pending_pixels(),
                err
            ),
        }
        outcome
    }

    /// Flush triggered by the scheduler. Errors are logged, never returned;
    /// the distance stays pending for the next tick.
    fn scheduled_flush(&self) {
        if self.state() != TrackerState::Running {
            debug!("tracker is {:?}, skipping scheduled flush", self.state());
            return;
        }
        match self.flush_now() {
            Ok(FlushOutcome::Merged { bucket, distance }) => debug!(
                "flushed {:.6} {} into {} {}:00",
                distance,
                self.unit.symbol(),
                bucket.date,
                bucket.hour
            ),
            Ok(FlushOutcome::Skipped) => debug!("nothing to flush"),
            Err(err) => {
                let failures = self.stats().consecutive_failures;
                if failures >= self.max_consecutive_failures {
                    error!(
                        "flush failed {} times in a row, {:.1} px pending: {:#}",
                        failures,
                        self.pending_pixels(),
                        err
                    );
                } else {
                    warn!("flush failed, will retry next cycle: {:#}", err);
                }
            }
        }
    }

    fn flush_with(&self, calibration: Calibration, now: DateTime<Local>) -> Result<FlushOutcome> {
        let _store = lock(&self.store_lock);

        let pixels = self.accumulator.drain_pixels();
        if pixels <= 0.0 {
            lock(&self.stats).skipped += 1;
            return Ok(FlushOutcome::Skipped);
        }

        let distance = to_physical(pixels, calibration.pixels_per_unit(), self.unit);
        let bucket = Bucket::from_local(now);

        match self.merge_into_ledger(&bucket, distance) {
            Ok(()) => {
                let mut stats = lock(&self.stats);
                stats.flushes += 1;
                stats.consecutive_failures = 0;
                stats.total_distance += distance;
                Ok(FlushOutcome::Merged { bucket, distance })
            }
            Err(err) => {
                self.accumulator.restore(pixels);
                let mut stats = lock(&self.stats);
                stats.failures += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                Err(err)
            }
        }
    }

    fn merge_into_ledger(&self, bucket: &Bucket, distance: f64) -> Result<()> {
        let mut ledger = self.repo.load()?;
        ledger.merge(&bucket.date, &bucket.hour, distance)?;
        self.repo.save(&ledger)
    }
}

// The guarded values are plain data that stay consistent even if a holder
// panicked, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::FixedDisplay;
    use crate::model::calibration::DisplayGeometry;
    use crate::model::ledger::Ledger;
    use crate::repository::InMemoryLedgerRepository;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    struct FixedClock(DateTime<Local>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            self.0
        }
    }

    #[derive(Default)]
    struct FlakyRepo {
        inner: InMemoryLedgerRepository,
        fail_loads: AtomicBool,
        fail_saves: AtomicBool,
        loads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl LedgerRepository for FlakyRepo {
        fn load(&self) -> Result<Ledger> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(anyhow!("permission denied"));
            }
            self.inner.load()
        }

        fn save(&self, ledger: &Ledger) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(anyhow!("disk full"));
            }
            self.inner.save(ledger)
        }
    }

    struct NoDisplay;

    impl DisplayQuery for NoDisplay {
        fn geometry(&self) -> Result<DisplayGeometry> {
            Err(anyhow!("display unavailable"))
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn running_service(repo: FlakyRepo) -> Arc<TrackingService<FlakyRepo>> {
        let service = Arc::new(
            TrackingService::new(repo, DistanceUnit::Metres)
                .with_clock(Box::new(FixedClock(at(9, 15)))),
        );
        service.calibrate_with(Calibration::new(96.0).unwrap()).unwrap();
        service.start(HOUR).unwrap();
        service
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[tokio::test]
    async fn test_end_to_end_flush() {
        let service = running_service(FlakyRepo::default());

        service.observe(0.0, 0.0);
        service.observe(96.0, 0.0);
        service.observe(96.0, 96.0);
        assert_eq!(service.pending_pixels(), 192.0);

        let outcome = service.flush_at(at(9, 30)).unwrap();
        let FlushOutcome::Merged { bucket, distance } = outcome else {
            panic!("expected a merge");
        };
        assert_eq!(bucket.date, "2024-01-01");
        assert_eq!(bucket.hour, "09");
        assert_close(distance, 0.0508);

        let ledger = service.repository().inner.snapshot();
        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"2024-01-01": {"total_distance": 0.0508, "09": 0.0508}})
        );
    }

    #[tokio::test]
    async fn test_second_flush_same_hour_accumulates() {
        let mut seed = Ledger::new();
        seed.merge("2023-12-31", "23", 2.0).unwrap();
        seed.merge("2024-01-01", "08", 0.5).unwrap();
        seed.merge("2024-01-01", "09", 0.0508).unwrap();
        let repo = FlakyRepo {
            inner: InMemoryLedgerRepository::new(seed),
            ..Default::default()
        };
        let service = running_service(repo);

        // 0.01 m at 96 px/in
        let pixels = 0.01 / 0.0254 * 96.0;
        service.observe(0.0, 0.0);
        service.observe(pixels, 0.0);
        service.flush_at(at(9, 45)).unwrap();

        let ledger = service.repository().inner.snapshot();
        let day = ledger.day("2024-01-01").unwrap();
        assert_close(day.total_distance, 0.5 + 0.0608);
        assert_close(day.hour("09"), 0.0608);
        assert_eq!(day.hour("08"), 0.5);
        assert_eq!(ledger.day("2023-12-31").unwrap().total_distance, 2.0);
    }

    #[tokio::test]
    async fn test_flush_uses_hour_of_flush_time() {
        let service = running_service(FlakyRepo::default());

        service.observe(0.0, 0.0);
        service.observe(96.0, 0.0);
        service.flush_at(at(9, 59)).unwrap();
        service.observe(192.0, 0.0);
        service.flush_at(at(10, 0)).unwrap();

        let ledger = service.repository().inner.snapshot();
        let day = ledger.day("2024-01-01").unwrap();
        assert_close(day.hour("09"), 0.0254);
        assert_close(day.hour("10"), 0.0254);
        assert_close(day.total_distance, 0.0508);
    }

    #[tokio::test]
    async fn test_empty_flush_skips_store() {
        let service = running_service(FlakyRepo::default());

        service.observe(10.0, 10.0);
        assert_eq!(service.flush_at(at(9, 30)).unwrap(), FlushOutcome::Skipped);
        assert_eq!(service.repository().loads.load(Ordering::SeqCst), 0);
        assert!(service.repository().inner.snapshot().is_empty());
        assert_eq!(service.stats().skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_distance_for_retry() {
        let service = running_service(FlakyRepo::default());
        service.repository().fail_saves.store(true, Ordering::SeqCst);

        service.observe(0.0, 0.0);
        service.observe(96.0, 0.0);
        assert!(service.flush_at(at(9, 30)).is_err());
        assert_eq!(service.pending_pixels(), 96.0);

        service.observe(192.0, 0.0);
        assert!(service.flush_at(at(9, 31)).is_err());
        assert_eq!(service.pending_pixels(), 192.0);
        assert_eq!(service.stats().consecutive_failures, 2);

        service.repository().fail_saves.store(false, Ordering::SeqCst);
        service.flush_at(at(9, 32)).unwrap();
        assert_eq!(service.pending_pixels(), 0.0);

        let stats = service.stats();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.flushes, 1);

        let ledger = service.repository().inner.snapshot();
        assert_close(ledger.day("2024-01-01").unwrap().hour("09"), 0.0508);
    }

    #[tokio::test]
    async fn test_unreadable_ledger_is_not_overwritten() {
        let service = running_service(FlakyRepo::default());
        service.repository().fail_loads.store(true, Ordering::SeqCst);

        service.observe(0.0, 0.0);
        service.observe(96.0, 0.0);
        assert!(service.flush_at(at(9, 30)).is_err());
        assert_eq!(service.pending_pixels(), 96.0);
        assert_eq!(service.repository().loads.load(Ordering::SeqCst), 1);
        assert_eq!(service.repository().saves.load(Ordering::SeqCst), 0);

        service.repository().fail_loads.store(false, Ordering::SeqCst);
        service.flush_at(at(9, 31)).unwrap();
        assert_close(
            service.repository().inner.snapshot().day("2024-01-01").unwrap().hour("09"),
            0.0254,
        );
    }

    #[tokio::test]
    async fn test_file_ledger_read_error_keeps_pending_distance() {
        let dir = std::env::temp_dir().join(format!("mousetrack-service-{}", uuid::Uuid::new_v4()));
        let repo = crate::repository::FileLedgerRepository::new(Some(dir.clone())).unwrap();
        // A directory where the ledger file should be cannot be read.
        std::fs::create_dir(repo.path()).unwrap();

        let service = Arc::new(
            TrackingService::new(repo, DistanceUnit::Metres)
                .with_clock(Box::new(FixedClock(at(9, 15)))),
        );
        service.calibrate_with(Calibration::new(96.0).unwrap()).unwrap();
        service.start(HOUR).unwrap();

        service.observe(0.0, 0.0);
        service.observe(0.0, 96.0);
        assert!(service.flush_at(at(9, 30)).is_err());
        assert_eq!(service.pending_pixels(), 96.0);
        assert!(service.repository().path().is_dir());
        assert!(!dir.join("data.json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_non_finite_sample_does_not_lose_later_movement() {
        let service = running_service(FlakyRepo::default());

        service.observe(0.0, 0.0);
        assert!(!service.observe(f64::NAN, 0.0));
        assert_eq!(service.flush_at(at(9, 10)).unwrap(), FlushOutcome::Skipped);

        service.observe(0.0, 0.0);
        service.observe(96.0, 0.0);
        service.observe(192.0, 0.0);
        assert_eq!(service.pending_pixels(), 192.0);
        service.flush_at(at(9, 20)).unwrap();

        let ledger = service.repository().inner.snapshot();
        assert_close(ledger.day("2024-01-01").unwrap().hour("09"), 0.0508);
        assert_eq!(service.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_samples_ignored_until_running() {
        let service = Arc::new(TrackingService::new(
            FlakyRepo::default(),
            DistanceUnit::Metres,
        ));
        assert_eq!(service.state(), TrackerState::Uninitialized);
        assert!(!service.observe(0.0, 0.0));

        let display = FixedDisplay {
            width_px: 1200,
            height_px: 1600,
            diagonal_inches: 20.0,
        };
        service.calibrate(&display, None).unwrap();
        assert_eq!(service.state(), TrackerState::Calibrated);
        assert!(!service.observe(100.0, 0.0));
        assert!(service.flush_at(at(9, 0)).is_err());

        service.start(HOUR).unwrap();
        assert_eq!(service.state(), TrackerState::Running);
        assert!(service.observe(0.0, 0.0));
        assert_eq!(service.pending_pixels(), 0.0);
    }

    #[tokio::test]
    async fn test_calibration_failure_keeps_uninitialized() {
        let service = Arc::new(TrackingService::new(
            FlakyRepo::default(),
            DistanceUnit::Metres,
        ));
        assert!(service.calibrate(&NoDisplay, None).is_err());
        assert_eq!(service.state(), TrackerState::Uninitialized);
        assert!(service.start(HOUR).is_err());

        let calibration = service.calibrate(&NoDisplay, Some(96.0)).unwrap();
        assert_eq!(calibration.pixels_per_unit(), 96.0);
        assert_eq!(service.state(), TrackerState::Calibrated);
        assert!(service.calibrate_with(calibration).is_err());
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_distance() {
        let service = running_service(FlakyRepo::default());

        service.observe(0.0, 0.0);
        service.observe(0.0, 96.0);

        let outcome = service.stop().await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Merged { .. }));
        assert_eq!(service.state(), TrackerState::Stopped);

        let ledger = service.repository().inner.snapshot();
        assert_close(ledger.day("2024-01-01").unwrap().hour("09"), 0.0254);

        assert!(!service.observe(0.0, 500.0));
        assert!(service.stop().await.is_err());
        assert!(service.flush_now().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_flushes_periodically() {
        let service = Arc::new(
            TrackingService::new(FlakyRepo::default(), DistanceUnit::Inches)
                .with_clock(Box::new(FixedClock(at(14, 0)))),
        );
        service.calibrate_with(Calibration::new(100.0).unwrap()).unwrap();
        service.start(Duration::from_millis(20)).unwrap();

        service.observe(0.0, 0.0);
        service.observe(300.0, 400.0);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(service.pending_pixels(), 0.0);
        assert!(service.stats().flushes >= 1);

        service.stop().await.unwrap();
        let ledger = service.repository().inner.snapshot();
        assert_close(ledger.day("2024-01-01").unwrap().hour("14"), 5.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_during_ticks_records_no_failures() {
        let service = Arc::new(
            TrackingService::new(FlakyRepo::default(), DistanceUnit::Metres)
                .with_clock(Box::new(FixedClock(at(11, 0)))),
        );
        service.calibrate_with(Calibration::new(96.0).unwrap()).unwrap();
        service.start(Duration::from_millis(1)).unwrap();

        for i in 0..50 {
            service.observe(i as f64, 0.0);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        service.stop().await.unwrap();

        assert_eq!(service.state(), TrackerState::Stopped);
        assert_eq!(service.stats().failures, 0);
        assert_eq!(service.pending_pixels(), 0.0);
        let ledger = service.repository().inner.snapshot();
        assert_close(ledger.day("2024-01-01").unwrap().hour("11"), 49.0 / 96.0 * 0.0254);
    }
}
