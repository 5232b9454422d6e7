//! Progress-callback trait for per-page analysis events.
//!
//! Inject an [`Arc<dyn PageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! query or extraction as it walks the document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pagemerge::{PageProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     analysed: AtomicUsize,
//! }
//!
//! impl PageProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
//!         self.analysed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} analysed ({} bytes)", page_num, total_pages, text_len);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { analysed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by [`crate::session`] as each page is analysed.
///
/// Pages are processed one at a time, in order, so events never interleave.
/// Every method has a no-op default.
pub trait PageProgressCallback: Send + Sync {
    /// Called once before the first page is pulled.
    ///
    /// `total_pages` is the number of pages that will be analysed, after the
    /// `max_pages` cap.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the analyzer sees a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the analyzer returned text for a page.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when a page failed: analyzer error (fatal) or malformed
    /// structured output (recorded and skipped).
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after a successful run.
    fn on_document_complete(&self, total_pages: usize, analysed: usize) {
        let _ = (total_pages, analysed);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl PageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        planned: AtomicUsize,
        analysed: AtomicUsize,
    }

    impl PageProgressCallback for TrackingCallback {
        fn on_document_start(&self, total_pages: usize) {
            self.planned.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _total_pages: usize, analysed: usize) {
            self.analysed.store(analysed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 42);
        cb.on_page_error(2, 5, "some error");
        cb.on_document_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_document_start(2);
        tracker.on_page_start(1, 2);
        tracker.on_page_complete(1, 2, 100);
        tracker.on_page_start(2, 2);
        tracker.on_page_error(2, 2, "malformed JSON");
        tracker.on_document_complete(2, 2);

        assert_eq!(tracker.planned.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.analysed.load(Ordering::SeqCst), 2);
    }
}
