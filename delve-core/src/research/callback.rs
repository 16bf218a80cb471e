//! Progress callbacks for research UIs.

use super::controller::SessionStatus;
use super::evidence::EvidenceEntry;
use super::focus::FocusArea;
use super::prompts::Assessment;
use super::session::SessionState;

/// Observer of a running research session.
///
/// Every method has an empty default so implementors only override what they
/// display.
pub trait ResearchCallback: Send + Sync {
    fn on_state_change(&self, _from: SessionState, _to: SessionState) {}

    /// A planning round added `areas`.
    fn on_plan(&self, _round: u32, _areas: &[FocusArea]) {}

    /// The controller picked the area for the next step.
    fn on_focus_selected(&self, _cycle: u32, _area: &FocusArea) {}

    /// A search query resolved to `hits` candidates.
    fn on_search(&self, _query: &str, _hits: usize) {}

    /// A non-fatal problem worth a status-line notice.
    fn on_notice(&self, _message: &str) {}

    /// A new entry went into the content store.
    fn on_evidence(&self, _entry: &EvidenceEntry) {}

    /// Reply to the `status` and `focus` commands.
    fn on_status(&self, _status: &SessionStatus) {}

    fn on_focus_report(&self, _area: Option<&FocusArea>) {}

    /// Result of the evidence-sufficiency check while paused.
    fn on_assessment(&self, _assessment: &Assessment) {}
}

/// Callback that ignores everything.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {}
