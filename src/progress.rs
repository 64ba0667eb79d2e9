//! Progress-callback trait for per-card extraction events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as the batch processes each card. Callers forward them wherever they like
//! (terminal progress bar, channel, log) without the library knowing how the
//! host application communicates.
//!
//! # Example
//!
//! ```rust
//! use cardscan::{ScanConfig, ScanProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ScanProgressCallback for CountingCallback {
//!     fn on_card_complete(&self, index: usize, total: usize, filename: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Card {}/{} done ({})", index + 1, total, filename);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(counter as Arc<dyn ScanProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each card.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1`,
/// `on_card_start`, `on_card_complete` and `on_card_error` may be called
/// concurrently. All methods default to no-ops.
///
/// `index` is always the 0-based position of the card in the submitted batch.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before any card is staged.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before a card is staged.
    fn on_card_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a card produced a record (including unreadable-card records).
    fn on_card_complete(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a card failed to stage or be recognised.
    fn on_card_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    /// Called once after every card has an outcome.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
        batch_success: AtomicUsize,
    }

    impl ScanProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_card_start(&self, _index: usize, _total: usize, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_card_complete(&self, _index: usize, _total: usize, _filename: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_card_error(&self, _index: usize, _total: usize, _filename: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.batch_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_card_start(0, 2, "a.jpg");
        cb.on_card_complete(0, 2, "a.jpg");
        cb.on_card_error(1, 2, "b.jpg", "upload failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        tracker.on_card_start(0, 3, "a.jpg");
        tracker.on_card_complete(0, 3, "a.jpg");
        tracker.on_card_start(1, 3, "b.jpg");
        tracker.on_card_error(1, 3, "b.jpg", "timeout");
        tracker.on_card_start(2, 3, "c.jpg");
        tracker.on_card_complete(2, 3, "c.jpg");
        tracker.on_batch_complete(3, 2);

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.batch_success.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ScanProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_card_start(0, 1, "a.png");
    }
}
