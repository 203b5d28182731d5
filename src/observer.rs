//! Observer trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::OcrConfigBuilder::observer`] to receive events as the
//! orchestrator walks the document. The CLI uses this to drive its progress
//! bar; a server could forward the same events to a channel.
//!
//! Pages are processed strictly one at a time, so events for one run arrive
//! in order on the orchestrator's task. Implementations must still be
//! `Send + Sync` because the config is shared across tasks.
//!
//! # Example
//!
//! ```rust
//! use pdfocr::{OcrConfig, PipelineObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl PipelineObserver for Counter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, _blocks: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .observer(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::RunReport;
use std::sync::Arc;

/// Receives pipeline events. Every method defaults to a no-op.
pub trait PipelineObserver: Send + Sync {
    /// Once, after the health check and progress load.
    ///
    /// `already_done` counts pages found in the progress record.
    fn on_run_start(&self, total_pages: usize, already_done: usize) {
        let _ = (total_pages, already_done);
    }

    /// A page was found in the progress record and will not be sent again.
    fn on_page_skipped(&self, page_num: usize) {
        let _ = page_num;
    }

    /// Just before a page is rasterised and sent for recognition.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// One streamed text fragment of the page being recognized.
    fn on_fragment(&self, page_num: usize, fragment: &str) {
        let _ = (page_num, fragment);
    }

    /// A page was recognized and persisted.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, blocks: usize) {
        let _ = (page_num, total_pages, blocks);
    }

    /// A page could not be recognized; the run continues.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Once, after assembly and extraction, with the final report.
    fn on_run_complete(&self, report: &RunReport) {
        let _ = report;
    }
}

/// The observer used when none is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Shared observer handle as stored in [`crate::config::OcrConfig`].
pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RunState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
        fragments: AtomicUsize,
    }

    impl PipelineObserver for Recording {
        fn on_run_start(&self, total: usize, done: usize) {
            self.events.lock().unwrap().push(format!("start {total} {done}"));
        }
        fn on_page_skipped(&self, page: usize) {
            self.events.lock().unwrap().push(format!("skip {page}"));
        }
        fn on_fragment(&self, _page: usize, _fragment: &str) {
            self.fragments.fetch_add(1, Ordering::SeqCst);
        }
        fn on_run_complete(&self, report: &RunReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {:?}", report.state));
        }
    }

    #[test]
    fn noop_observer_accepts_every_event() {
        let obs = NoopObserver;
        obs.on_run_start(3, 1);
        obs.on_page_skipped(1);
        obs.on_page_start(2, 3);
        obs.on_fragment(2, "abc");
        obs.on_page_complete(2, 3, 7);
        obs.on_page_error(3, 3, "boom");
        obs.on_run_complete(&RunReport::default());
    }

    #[test]
    fn overridden_methods_receive_events_through_arc_dyn() {
        let rec = Arc::new(Recording::default());
        let shared: SharedObserver = rec.clone();

        shared.on_run_start(3, 2);
        shared.on_page_skipped(1);
        shared.on_fragment(3, "a");
        shared.on_fragment(3, "b");
        // Not overridden: must be a silent no-op.
        shared.on_page_error(3, 3, "ignored");
        shared.on_run_complete(&RunReport {
            state: RunState::Done,
            ..RunReport::default()
        });

        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start 3 2", "skip 1", "complete Done"]
        );
        assert_eq!(rec.fragments.load(Ordering::SeqCst), 2);
    }
}
