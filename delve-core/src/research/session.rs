//! Research session state machine and the on-disk session snapshot.

use super::evidence::EvidenceEntry;
use super::focus::FocusArea;
use super::summarizer::Summary;
use crate::error::ResearchError;
use crate::search::ProviderState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Phase of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Producing the first set of focus areas.
    Planning,
    /// Running controller steps (re-planning included).
    Researching,
    /// Halted at a checkpoint, waiting for continue or quit.
    Paused,
    /// Building the digest and final summary.
    Summarizing,
    /// Answering follow-up questions from the frozen digest.
    Conversing,
    Terminated,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Planning, Researching)
                | (Planning, Summarizing)
                | (Researching, Paused)
                | (Researching, Summarizing)
                | (Paused, Researching)
                | (Paused, Summarizing)
                | (Summarizing, Conversing)
                | (Conversing, Terminated)
        )
    }

    pub fn is_researching(self) -> bool {
        matches!(self, SessionState::Planning | SessionState::Researching | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Planning => "planning",
            SessionState::Researching => "researching",
            SessionState::Paused => "paused",
            SessionState::Summarizing => "summarizing",
            SessionState::Conversing => "conversing",
            SessionState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// The single session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    /// The original research query. Never changes.
    pub query: String,
    pub state: SessionState,
    /// Controller steps completed.
    pub cycle: u32,
    /// Planning rounds run, the first included.
    pub planning_rounds: u32,
    /// Focus area the controller is working on or last worked on.
    pub current_focus: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchSession {
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            state: SessionState::Planning,
            cycle: 0,
            planning_rounds: 0,
            current_focus: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: SessionState) -> Result<(), ResearchError> {
        if !self.state.can_transition_to(next) {
            return Err(ResearchError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self.state, to = %next, session = %self.id, "Session transition");
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Everything worth keeping from a finished research phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: ResearchSession,
    pub focus_areas: Vec<FocusArea>,
    pub evidence: Vec<EvidenceEntry>,
    pub summary: Option<Summary>,
    pub providers: Vec<ProviderState>,
}

impl SessionSnapshot {
    pub fn file_name(id: &Uuid) -> String {
        format!("session-{id}.json")
    }

    /// Write atomically into `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(Self::file_name(&self.session.id));
        crate::persistence::atomic_write_json(&path, self)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> std::io::Result<Option<Self>> {
        crate::persistence::load_json(path)
    }
}
