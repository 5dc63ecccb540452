//! Progress-callback trait and ETA tracking for bundle runs.
//!
//! Inject an [`Arc<dyn BundleProgressCallback>`] via
//! [`crate::config::BundleConfigBuilder::progress_callback`] to receive
//! events as the worker pool processes each URL.
//!
//! Two kinds of events arrive:
//!
//! * **Per-URL events** (`on_url_start`, `on_url_complete`, `on_url_error`,
//!   `on_url_skipped`) fire from inside the workers, in completion order.
//! * **Progress ticks** (`on_progress`) fire from the poll loop every
//!   `poll_interval_ms`, carrying a [`ProgressSnapshot`] with the completed
//!   count and an ETA.
//!
//! # Example
//!
//! ```rust
//! use webpage2pdf_bundle::{BundleConfig, BundleProgressCallback, ProgressSnapshot};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BundleProgressCallback for Printer {
//!     fn on_progress(&self, snapshot: &ProgressSnapshot) {
//!         eprintln!("{}/{} ETA {}", snapshot.completed, snapshot.total, snapshot.eta_label());
//!     }
//! }
//!
//! let config = BundleConfig::builder()
//!     .csv_path("urls.csv")
//!     .progress_callback(Arc::new(Printer) as Arc<dyn BundleProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Called by the bundle runner as it processes each URL.
///
/// Implementations must be `Send + Sync`: per-URL methods may be called
/// concurrently from different workers. All methods have no-op defaults.
pub trait BundleProgressCallback: Send + Sync {
    /// Called once after the CSV was read, before any renderer starts.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before the renderer is launched for a URL.
    fn on_url_start(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when a URL was rendered successfully.
    fn on_url_complete(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when rendering a URL failed. The batch continues.
    fn on_url_error(&self, index: usize, total: usize, url: &str, error: &str) {
        let _ = (index, total, url, error);
    }

    /// Called for a URL that never started because the run was cancelled.
    fn on_url_skipped(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called by the poll loop at a fixed interval, and once more at the end.
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }

    /// Called before the rendered PDFs are merged (merged mode only).
    fn on_merge_start(&self, inputs: usize) {
        let _ = inputs;
    }

    /// Called once after all URLs were attempted and the merge (if any) ran.
    fn on_batch_complete(&self, total: usize, rendered: usize) {
        let _ = (total, rendered);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BundleProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BundleConfig`].
pub type ProgressCallback = Arc<dyn BundleProgressCallback>;

/// A point-in-time view of a running batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// URLs finished so far, whatever their outcome.
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
    /// Estimated time remaining; `None` until the first URL finishes.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Fraction complete in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Human-readable ETA, e.g. `"42 sec"` or `"Calculating..."`.
    pub fn eta_label(&self) -> String {
        match self.eta {
            Some(eta) => format!("{} sec", eta.as_secs()),
            None => "Calculating...".to_string(),
        }
    }
}

/// Average-rate ETA estimator anchored at the start of a batch.
#[derive(Debug, Clone)]
pub struct EtaTracker {
    started: Instant,
    total: usize,
}

impl EtaTracker {
    pub fn new(total: usize) -> Self {
        Self::starting_at(Instant::now(), total)
    }

    pub fn starting_at(started: Instant, total: usize) -> Self {
        Self { started, total }
    }

    /// Snapshot for `completed` finished URLs, measured against the wall clock.
    pub fn snapshot(&self, completed: usize) -> ProgressSnapshot {
        self.snapshot_at(self.started.elapsed(), completed)
    }

    /// Snapshot for a given elapsed time; split out so it can be tested
    /// without sleeping.
    pub fn snapshot_at(&self, elapsed: Duration, completed: usize) -> ProgressSnapshot {
        let completed = completed.min(self.total);
        ProgressSnapshot {
            completed,
            total: self.total,
            elapsed,
            eta: estimate_remaining(elapsed, completed, self.total),
        }
    }
}

/// `remaining × (elapsed / completed)`, or `None` when nothing has finished.
pub fn estimate_remaining(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as u32;
    let average = elapsed / completed as u32;
    Some(average * remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        skipped: AtomicUsize,
        ticks: AtomicUsize,
    }

    impl BundleProgressCallback for TrackingCallback {
        fn on_url_start(&self, _index: usize, _total: usize, _url: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_url_complete(&self, _index: usize, _total: usize, _url: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_url_error(&self, _index: usize, _total: usize, _url: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_url_skipped(&self, _index: usize, _total: usize, _url: &str) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, _snapshot: &ProgressSnapshot) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_url_start(1, 3, "https://a.example");
        cb.on_url_complete(1, 3, "https://a.example");
        cb.on_url_error(2, 3, "https://b.example", "boom");
        cb.on_url_skipped(3, 3, "https://c.example");
        cb.on_progress(&EtaTracker::new(3).snapshot(2));
        cb.on_merge_start(1);
        cb.on_batch_complete(3, 1);
    }

    #[test]
    fn tracking_callback_through_arc_dyn() {
        let tracker = Arc::new(TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = tracker.clone();

        cb.on_url_start(1, 2, "u1");
        cb.on_url_complete(1, 2, "u1");
        cb.on_url_start(2, 2, "u2");
        cb.on_url_error(2, 2, "u2", "timeout");
        cb.on_url_skipped(3, 3, "u3");
        cb.on_progress(&EtaTracker::new(2).snapshot(2));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eta_is_unknown_before_first_completion() {
        let tracker = EtaTracker::new(10);
        let snap = tracker.snapshot_at(Duration::from_secs(5), 0);
        assert_eq!(snap.eta, None);
        assert_eq!(snap.eta_label(), "Calculating...");
    }

    #[test]
    fn eta_scales_average_by_remaining() {
        let tracker = EtaTracker::new(10);
        // 4 done in 8s → 2s each → 6 remaining → 12s
        let snap = tracker.snapshot_at(Duration::from_secs(8), 4);
        assert_eq!(snap.eta, Some(Duration::from_secs(12)));
        assert_eq!(snap.eta_label(), "12 sec");
        assert!((snap.fraction() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_is_zero_when_finished() {
        let tracker = EtaTracker::new(3);
        let snap = tracker.snapshot_at(Duration::from_secs(9), 3);
        assert_eq!(snap.eta, Some(Duration::ZERO));
    }

    #[test]
    fn completed_is_clamped_to_total() {
        let tracker = EtaTracker::new(2);
        let snap = tracker.snapshot_at(Duration::from_secs(1), 5);
        assert_eq!(snap.completed, 2);
    }
}
