//! Run outcome types returned by the orchestrator.

use serde::Serialize;
use std::path::PathBuf;

/// Orchestrator states.
///
/// ```text
/// Idle → HealthChecking → Recognizing → Assembling → Extracting → Done
///              │                │
///              ▼                ▼ (interrupt; still assembles and extracts)
///           Aborted      PartiallyComplete
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    HealthChecking,
    Recognizing,
    Assembling,
    Extracting,
    Done,
    Aborted,
    PartiallyComplete,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::Aborted | RunState::PartiallyComplete
        )
    }
}

/// A page that could not be recognized in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
    pub page: usize,
    pub error: String,
}

/// Summary of one run.
///
/// `success()` is the single boolean a caller maps to an exit code or HTTP
/// status. Counts and paths are there for logs and UIs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Terminal state reached.
    pub state: RunState,
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages present in the progress record at the end of the run.
    pub recognized_pages: usize,
    /// Pages loaded from an earlier run and not sent again.
    pub resumed_pages: usize,
    /// Pages recognized during this run.
    pub newly_recognized: usize,
    /// Pages that failed in this run, in page order.
    pub failed_pages: Vec<FailedPage>,
    /// Recognition requests issued (one per attempted page).
    pub recognition_calls: usize,
    /// Markdown file written, if any page was recognized.
    pub markdown_path: Option<PathBuf>,
    /// Figure crops written.
    pub images_written: Vec<PathBuf>,
    /// Figure crops that failed, as display strings.
    pub image_failures: Vec<String>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl RunReport {
    /// `true` when the run went all the way through to [`RunState::Done`].
    ///
    /// Individual page or crop failures do not make a run unsuccessful;
    /// interruption does.
    pub fn success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Pages still missing from the progress record.
    pub fn missing_pages(&self) -> usize {
        self.total_pages.saturating_sub(self.recognized_pages)
    }
}
