//! Iterative research engine.
//!
//! A session moves through planning, research steps, an optional pause,
//! summarizing and conversation:
//! - `focus` and `planner` decide what to investigate next
//! - `controller` runs the steps against the search chain and the fetcher
//! - `evidence` keeps deduplicated findings with provenance
//! - `digest` and `summarizer` turn findings into a bounded context
//! - `command` carries user commands into the loop between steps

pub mod callback;
pub mod command;
pub mod controller;
pub mod digest;
pub mod evidence;
pub mod focus;
pub mod log;
pub mod planner;
pub mod prompts;
pub mod session;
pub mod summarizer;

pub use callback::{NoOpResearchCallback, ResearchCallback};
pub use command::{Command, CommandGate};
pub use controller::{CycleController, SessionStatus, StopReason};
pub use digest::{Digest, build_digest};
pub use evidence::{ContentStore, EvidenceEntry, fingerprint};
pub use focus::{FocusArea, FocusBoard, FocusStatus};
pub use log::ResearchLog;
pub use planner::FocusPlanner;
pub use prompts::Assessment;
pub use session::{ResearchSession, SessionSnapshot, SessionState};
pub use summarizer::{ConversationEngine, Summarizer, Summary};
