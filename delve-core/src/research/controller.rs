//! The research cycle controller.
//!
//! Drives one session from planning to conversation. Each step works on the
//! highest-priority open focus area:
//! 1. select the area, re-planning when every area is exhausted
//! 2. ask the LLM for search queries
//! 3. resolve each query through the fallback chain
//! 4. ask the LLM which candidates to read
//! 5. fetch them and add new evidence to the store
//! 6. charge the queries against the area's budget
//!
//! Commands are taken from the gate only between steps, so a pause or quit
//! never interrupts a fetch or a store write.

use super::callback::{NoOpResearchCallback, ResearchCallback};
use super::command::{Command, CommandGate};
use super::digest::{Digest, build_digest, evidence_budget};
use super::evidence::{ContentStore, EvidenceEntry};
use super::focus::{FocusArea, FocusBoard};
use super::log::ResearchLog;
use super::planner::FocusPlanner;
use super::prompts::{self, Assessment};
use super::session::{ResearchSession, SessionSnapshot, SessionState};
use super::summarizer::{ConversationEngine, Summarizer, Summary};
use crate::brain::Brain;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::fetch::Fetcher;
use crate::search::{ProviderFallbackChain, ProviderState, SearchHit};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Candidates offered to the selection prompt per step.
const MAX_CANDIDATES: usize = 20;

/// Why the research phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    UserQuit,
    PlanningFailed(String),
    /// Re-planning produced nothing new.
    PlannerExhausted,
    /// `max_planning_rounds` reached.
    RoundLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::UserQuit => write!(f, "stopped by user"),
            StopReason::PlanningFailed(message) => write!(f, "planning failed: {message}"),
            StopReason::PlannerExhausted => write!(f, "planner found nothing new to investigate"),
            StopReason::RoundLimit => write!(f, "planning round limit reached"),
        }
    }
}

/// Answer to the `status` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub state: SessionState,
    pub cycle: u32,
    pub planning_rounds: u32,
    pub current_focus: Option<FocusArea>,
    pub areas_active: usize,
    pub areas_exhausted: usize,
    pub evidence_count: usize,
    pub evidence_chars: usize,
    pub providers: Vec<ProviderState>,
}

pub struct CycleController {
    session: ResearchSession,
    config: ResearchConfig,
    board: FocusBoard,
    store: ContentStore,
    chain: ProviderFallbackChain,
    brain: Arc<Brain>,
    fetcher: Arc<dyn Fetcher>,
    planner: FocusPlanner,
    gate: CommandGate,
    callback: Arc<dyn ResearchCallback>,
    log: Option<ResearchLog>,
    snapshot_dir: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
    summary: Option<Summary>,
    fetch_timeout: Duration,
    /// Queries already issued, per focus area.
    issued: HashMap<usize, Vec<String>>,
}

impl CycleController {
    pub fn new(
        query: impl Into<String>,
        config: ResearchConfig,
        brain: Arc<Brain>,
        chain: ProviderFallbackChain,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let planner = FocusPlanner::new(brain.clone(), &config);
        Self {
            session: ResearchSession::new(query),
            config,
            board: FocusBoard::new(),
            store: ContentStore::new(),
            chain,
            brain,
            fetcher,
            planner,
            gate: CommandGate::new(),
            callback: Arc::new(NoOpResearchCallback),
            log: None,
            snapshot_dir: None,
            snapshot_path: None,
            summary: None,
            fetch_timeout: Duration::from_secs(30),
            issued: HashMap::new(),
        }
    }

    pub fn with_gate(mut self, gate: CommandGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Append evidence and the summary to a log file in `dir`.
    ///
    /// A log that cannot be created is reported and research runs without it.
    pub fn with_log_dir(mut self, dir: &Path) -> Self {
        match ResearchLog::create(dir, &self.session) {
            Ok(log) => {
                info!(path = %log.path().display(), "Research log created");
                self.log = Some(log);
            }
            Err(e) => warn!(error = %e, dir = %dir.display(), "Could not create research log"),
        }
        self
    }

    /// Write a JSON snapshot into `dir` when the session enters Conversing.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Handle for posting commands from another task.
    pub fn gate(&self) -> CommandGate {
        self.gate.clone()
    }

    pub fn session(&self) -> &ResearchSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn board(&self) -> &FocusBoard {
        &self.board
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn chain(&self) -> &ProviderFallbackChain {
        &self.chain
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|l| l.path())
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // -----------------------------------------------------------------------
    // Research loop
    // -----------------------------------------------------------------------

    /// Run research until quit, planner failure or planner exhaustion.
    ///
    /// On `Ok` the session is in `Summarizing`.
    pub async fn run(&mut self) -> Result<StopReason, ResearchError> {
        info!(session = %self.session.id, query = %self.session.query, "Research started");

        if self.config.max_planning_rounds == Some(0) {
            self.set_state(SessionState::Summarizing)?;
            return Ok(StopReason::RoundLimit);
        }

        if let Some(reason) = self.plan(1).await? {
            return Ok(reason);
        }
        self.set_state(SessionState::Researching)?;

        loop {
            if let Some(reason) = self.checkpoint().await? {
                return Ok(reason);
            }
            if let Some(reason) = self.step().await? {
                return Ok(reason);
            }
        }
    }

    /// Run one planning round. `Some` means research is over.
    async fn plan(&mut self, round: u32) -> Result<Option<StopReason>, ResearchError> {
        let outcome = self
            .planner
            .plan_round(&self.session.query, self.store.all(), &mut self.board, round)
            .await;
        match outcome {
            Ok(ids) if ids.is_empty() => {
                info!(round, "Planner produced no new focus areas");
                self.callback.on_notice("No new focus areas to investigate");
                self.set_state(SessionState::Summarizing)?;
                Ok(Some(StopReason::PlannerExhausted))
            }
            Ok(ids) => {
                self.session.planning_rounds = round;
                let areas: Vec<FocusArea> =
                    ids.iter().filter_map(|id| self.board.get(*id).cloned()).collect();
                self.callback.on_plan(round, &areas);
                Ok(None)
            }
            Err(ResearchError::PlanningFailed { message }) => {
                warn!(round, %message, "Planning failed, moving to summary");
                self.callback
                    .on_notice(&format!("Planning failed: {message}"));
                self.set_state(SessionState::Summarizing)?;
                Ok(Some(StopReason::PlanningFailed(message)))
            }
            Err(e) => Err(e),
        }
    }

    /// One controller step. `Some` means research is over.
    pub async fn step(&mut self) -> Result<Option<StopReason>, ResearchError> {
        if self.board.next_open().is_none() {
            if let Some(max) = self.config.max_planning_rounds
                && self.session.planning_rounds as usize >= max
            {
                info!(max, "Planning round limit reached");
                self.set_state(SessionState::Summarizing)?;
                return Ok(Some(StopReason::RoundLimit));
            }
            let round = self.session.planning_rounds + 1;
            if let Some(reason) = self.plan(round).await? {
                return Ok(Some(reason));
            }
        }
        let Some(area) = self.board.next_open().cloned() else {
            self.set_state(SessionState::Summarizing)?;
            return Ok(Some(StopReason::PlannerExhausted));
        };

        self.session.cycle += 1;
        let cycle = self.session.cycle;
        self.session.current_focus = Some(area.id);
        self.board.mark_in_progress(area.id);
        self.callback.on_focus_selected(cycle, &area);
        debug!(cycle, focus_area = area.id, description = %area.description, "Step started");

        let budget = self.config.queries_per_area.max(1);
        let remaining = budget.saturating_sub(area.queries_issued).max(1);
        let per_step = self.config.queries_per_step.max(1).min(remaining);
        let queries = self.formulate_queries(&area, per_step).await;

        let candidates = self.search(&queries).await;
        let selected = self.select(&area, &candidates).await;
        self.fetch_and_store(&area, selected).await;

        if let Some(status) = self
            .board
            .spend(area.id, queries.len().max(1), budget)
        {
            debug!(focus_area = area.id, %status, "Step finished");
        }
        Ok(None)
    }

    async fn formulate_queries(&mut self, area: &FocusArea, count: usize) -> Vec<String> {
        let used = self.issued.entry(area.id).or_default().clone();
        let prompt = prompts::queries(&self.session.query, &area.description, count, &used);

        let mut queries: Vec<String> = match self.brain.generate(&prompt, "").await {
            Ok(reply) => prompts::parse_queries(&reply, count + used.len())
                .into_iter()
                .filter(|q| !used.iter().any(|u| u.eq_ignore_ascii_case(q)))
                .take(count)
                .collect(),
            Err(e) => {
                warn!(error = %e, focus_area = area.id, "Query formulation failed");
                Vec::new()
            }
        };

        if queries.is_empty() {
            queries = [
                area.description.clone(),
                format!("{} {}", self.session.query, area.description),
            ]
            .into_iter()
            .filter(|q| !used.iter().any(|u| u.eq_ignore_ascii_case(q)))
            .take(count)
            .collect();
            debug!(focus_area = area.id, fallback = queries.len(), "Using focus area as query");
        }

        self.issued
            .entry(area.id)
            .or_default()
            .extend(queries.iter().cloned());
        queries
    }

    /// Resolve every query, keeping the first hit per URL.
    async fn search(&mut self, queries: &[String]) -> Vec<(SearchHit, String)> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for query in queries {
            match self.chain.resolve(query).await {
                Ok(hits) => {
                    self.callback.on_search(query, hits.len());
                    for hit in hits {
                        if seen.insert(hit.url.clone()) {
                            candidates.push((hit, query.clone()));
                        }
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search failed, continuing with next query");
                    self.callback.on_notice(&e.to_string());
                }
            }
        }
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }

    async fn select(
        &self,
        area: &FocusArea,
        candidates: &[(SearchHit, String)],
    ) -> Vec<(SearchHit, String)> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let max = self.config.max_selected_results.max(1);
        let hits: Vec<SearchHit> = candidates.iter().map(|(h, _)| h.clone()).collect();
        let prompt = prompts::select(&self.session.query, &area.description, &hits, max);

        let mut picked = match self.brain.generate(&prompt, "").await {
            Ok(reply) => prompts::parse_selection(&reply, candidates.len(), max),
            Err(e) => {
                warn!(error = %e, "Result selection failed");
                Vec::new()
            }
        };
        if picked.is_empty() {
            debug!("No usable selection, taking top results");
            picked = (0..candidates.len().min(max)).collect();
        }
        picked.into_iter().map(|i| candidates[i].clone()).collect()
    }

    async fn fetch_and_store(&mut self, area: &FocusArea, selected: Vec<(SearchHit, String)>) {
        for (hit, query) in selected {
            let text = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&hit.url))
                .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(url = %hit.url, error = %e, "Fetch failed, skipping");
                    self.callback.on_notice(&e.to_string());
                    continue;
                }
                Err(_) => {
                    warn!(url = %hit.url, timeout_secs = self.fetch_timeout.as_secs(), "Fetch timed out, skipping");
                    self.callback
                        .on_notice(&format!("Fetch of {} timed out", hit.url));
                    continue;
                }
            };

            let entry = EvidenceEntry::new(&hit.url, text, area.id, &query);
            if !self.store.add(entry) {
                debug!(url = %hit.url, "Duplicate content discarded");
                continue;
            }
            let Some(stored) = self.store.last() else {
                continue;
            };
            info!(url = %stored.url, focus_area = area.id, evidence = self.store.len(), "Evidence stored");
            if let Some(log) = self.log.as_mut()
                && let Err(e) = log.append_entry(stored, &area.description)
            {
                warn!(error = %e, "Could not write research log entry");
            }
            self.callback.on_evidence(stored);
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Consume at most one pending command. `Some` means research is over.
    async fn checkpoint(&mut self) -> Result<Option<StopReason>, ResearchError> {
        let Some(command) = self.gate.take() else {
            return Ok(None);
        };
        debug!(%command, cycle = self.session.cycle, "Command taken at checkpoint");
        match command {
            Command::Status => self.callback.on_status(&self.status()),
            Command::Focus => self.report_focus(),
            Command::Continue => debug!("Continue while researching ignored"),
            Command::Quit => {
                self.set_state(SessionState::Summarizing)?;
                return Ok(Some(StopReason::UserQuit));
            }
            Command::Pause => return self.pause().await,
        }
        Ok(None)
    }

    /// Pause, assess the evidence once, then wait for continue or quit.
    async fn pause(&mut self) -> Result<Option<StopReason>, ResearchError> {
        self.set_state(SessionState::Paused)?;
        let assessment = self.assess().await;
        self.callback.on_assessment(&assessment);

        loop {
            match self.gate.wait().await {
                Command::Continue => {
                    self.set_state(SessionState::Researching)?;
                    return Ok(None);
                }
                Command::Quit => {
                    self.set_state(SessionState::Summarizing)?;
                    return Ok(Some(StopReason::UserQuit));
                }
                Command::Status => self.callback.on_status(&self.status()),
                Command::Focus => self.report_focus(),
                Command::Pause => debug!("Already paused"),
            }
        }
    }

    fn report_focus(&self) {
        let area = self.session.current_focus.and_then(|id| self.board.get(id));
        self.callback.on_focus_report(area);
    }

    /// Ask the LLM whether the evidence so far answers the query.
    pub async fn assess(&self) -> Assessment {
        let digest = self.digest();
        if digest.is_empty() {
            return Assessment {
                sufficient: false,
                explanation: "No evidence collected yet.".to_string(),
            };
        }
        match self
            .brain
            .generate(&prompts::assess(&self.session.query), &digest.text)
            .await
        {
            Ok(reply) => Assessment::parse(&reply),
            Err(e) => {
                warn!(error = %e, "Assessment failed");
                Assessment {
                    sufficient: false,
                    explanation: format!("Assessment unavailable: {e}"),
                }
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session.id,
            state: self.session.state,
            cycle: self.session.cycle,
            planning_rounds: self.session.planning_rounds,
            current_focus: self
                .session
                .current_focus
                .and_then(|id| self.board.get(id).cloned()),
            areas_active: self.board.active_count(),
            areas_exhausted: self.board.exhausted_count(),
            evidence_count: self.store.len(),
            evidence_chars: self.store.size_estimate(),
            providers: self.chain.states(),
        }
    }

    // -----------------------------------------------------------------------
    // Summary and conversation
    // -----------------------------------------------------------------------

    fn digest(&self) -> Digest {
        build_digest(
            self.store.all(),
            &self.board,
            evidence_budget(self.brain.context_budget()),
            self.config.min_entry_chars,
        )
    }

    /// Freeze the evidence, produce the summary and open the conversation.
    ///
    /// Moves `Summarizing -> Conversing`; a session still researching is
    /// moved to `Summarizing` first.
    pub async fn summarize(&mut self) -> Result<ConversationEngine, ResearchError> {
        if self.session.state != SessionState::Summarizing {
            self.set_state(SessionState::Summarizing)?;
        }

        let digest = self.digest();
        if digest.entries_dropped > 0 {
            info!(
                included = digest.entries_included,
                dropped = digest.entries_dropped,
                "Evidence trimmed to context budget"
            );
        }
        let summary = Summarizer::new(self.brain.clone())
            .summarize(&self.session.query, &digest, self.store.len())
            .await;

        if let Some(log) = self.log.as_mut()
            && let Err(e) = log.append_summary(&summary)
        {
            warn!(error = %e, "Could not write summary to research log");
        }
        self.summary = Some(summary.clone());
        self.set_state(SessionState::Conversing)?;
        self.save_snapshot();

        Ok(ConversationEngine::new(
            self.brain.clone(),
            self.session.query.clone(),
            digest,
            summary,
            self.config.conversation_history_turns,
        ))
    }

    /// End the conversation.
    pub fn terminate(&mut self) -> Result<(), ResearchError> {
        self.set_state(SessionState::Terminated)?;
        info!(session = %self.session.id, evidence = self.store.len(), "Session terminated");
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            focus_areas: self.board.areas().to_vec(),
            evidence: self.store.all().to_vec(),
            summary: self.summary.clone(),
            providers: self.chain.states(),
        }
    }

    fn save_snapshot(&mut self) {
        let Some(dir) = self.snapshot_dir.as_ref() else {
            return;
        };
        match self.snapshot().save(dir) {
            Ok(path) => {
                info!(path = %path.display(), "Session snapshot saved");
                self.snapshot_path = Some(path);
            }
            Err(e) => warn!(error = %e, "Could not save session snapshot"),
        }
    }

    fn set_state(&mut self, next: SessionState) -> Result<(), ResearchError> {
        let from = self.session.state;
        self.session.transition(next)?;
        info!(%from, to = %next, cycle = self.session.cycle, "Session state changed");
        self.callback.on_state_change(from, next);
        Ok(())
    }
}
