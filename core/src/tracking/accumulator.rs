use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::sample::Sample;

/// Pixel distance travelled since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceAccumulator {
    last_position: Option<Sample>,
    pixel_distance: f64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the step from the previous position. Samples that are not
    /// finite, or whose step would make the total non-finite, are ignored
    /// and leave `last_position` untouched. Returns whether it was counted.
    pub fn observe(&mut self, sample: Sample) -> bool {
        if !sample.x.is_finite() || !sample.y.is_finite() {
            return false;
        }
        if let Some(prev) = &self.last_position {
            let total = self.pixel_distance + prev.distance_to(&sample);
            if !total.is_finite() {
                return false;
            }
            self.pixel_distance = total;
        }
        self.last_position = Some(sample);
        true
    }

    /// Returns the accumulated distance and resets it to zero.
    /// `last_position` is kept so the next sample does not count from zero.
    pub fn drain_pixels(&mut self) -> f64 {
        std::mem::take(&mut self.pixel_distance)
    }

    /// Puts back pixels that were drained but could not be persisted.
    pub fn restore(&mut self, pixels: f64) {
        if pixels.is_finite() && pixels > 0.0 {
            self.pixel_distance += pixels;
        }
    }

    pub fn pending_pixels(&self) -> f64 {
        self.pixel_distance
    }

    pub fn last_position(&self) -> Option<Sample> {
        self.last_position
    }
}

/// Accumulator shared between the input callback and the flush task.
/// Each operation holds the lock for its whole duration, so a drain sees
/// an observation either completely or not at all.
#[derive(Debug, Clone, Default)]
pub struct SharedAccumulator {
    inner: Arc<Mutex<DistanceAccumulator>>,
}

impl SharedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, sample: Sample) -> bool {
        self.lock().observe(sample)
    }

    pub fn drain_pixels(&self) -> f64 {
        self.lock().drain_pixels()
    }

    pub fn restore(&self, pixels: f64) {
        self.lock().restore(pixels);
    }

    pub fn pending_pixels(&self) -> f64 {
        self.lock().pending_pixels()
    }

    // A panic while holding the lock cannot leave the accumulator half
    // updated, so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, DistanceAccumulator> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
