//! Progress reporting for bulk runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Receives progress of a bulk run: one unit per completed tile per raster.
pub trait ProgressSink: Send + Sync {
    /// Called once before any work with the total number of units.
    fn begin(&self, label: &str, total: u64);

    /// Called from worker threads as units complete.
    fn worked(&self, units: u64);

    /// Called once when the run has drained, successful or not.
    fn done(&self);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn begin(&self, _label: &str, _total: u64) {}

    fn worked(&self, _units: u64) {}

    fn done(&self) {}
}

/// Sink that counts units, for hosts polling progress and for tests.
#[derive(Debug, Default)]
pub struct CountingProgress {
    label: Mutex<String>,
    total: AtomicU64,
    completed: AtomicU64,
    finished: AtomicBool,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> String {
        self.label.lock().clone()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.completed() as f64 / total as f64,
        }
    }
}

impl ProgressSink for CountingProgress {
    fn begin(&self, label: &str, total: u64) {
        *self.label.lock() = label.to_string();
        self.total.store(total, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    fn worked(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::AcqRel);
    }

    fn done(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_progress() {
        let progress = CountingProgress::new();
        progress.begin("scene", 8);
        progress.worked(2);
        progress.worked(2);
        assert_eq!(progress.completed(), 4);
        assert_eq!(progress.fraction(), 0.5);
        assert!(!progress.is_done());
        progress.done();
        assert!(progress.is_done());
        assert_eq!(progress.label(), "scene");
    }
}
