//! Shared test doubles for the research integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::brain::{Brain, MockLlmProvider, RESEARCH_SYSTEM_PROMPT};
use delve_core::error::{FetchError, ProviderError, ProviderErrorKind};
use delve_core::fetch::Fetcher;
use delve_core::research::prompts::{self, Assessment};
use delve_core::research::{
    Command, CommandGate, EvidenceEntry, FocusArea, ResearchCallback, SessionState,
    SessionStatus,
};
use delve_core::search::{SearchHit, SearchProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Focus area named in a queries/selection prompt.
pub fn focus_of(prompt: &str) -> Option<&str> {
    let start = prompt.find("Focus area: \"")? + "Focus area: \"".len();
    let end = prompt[start..].find('"')? + start;
    Some(&prompt[start..end])
}

/// A brain whose replies are routed on prompt markers.
///
/// The planner always proposes `areas`; each area gets the query
/// "<area> query"; selection picks the first three results.
pub fn research_brain(areas: &[&str]) -> (Arc<Brain>, Arc<MockLlmProvider>) {
    let plan = areas
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {a}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let mock = Arc::new(MockLlmProvider::with_responder(move |prompt| {
        if prompt.contains(prompts::PLAN_MARKER) {
            Some(plan.clone())
        } else if prompt.contains(prompts::QUERIES_MARKER) {
            focus_of(prompt).map(|area| format!("{area} query"))
        } else if prompt.contains(prompts::SELECT_MARKER) {
            Some("Selected Results: 1, 2, 3".to_string())
        } else if prompt.contains(prompts::ASSESS_MARKER) {
            Some("No. More sources are needed.".to_string())
        } else if prompt.contains(prompts::SUMMARY_MARKER) {
            Some("Synthesized answer [1].".to_string())
        } else if prompt.contains(prompts::FOLLOWUP_MARKER) {
            Some("Follow-up answer [1].".to_string())
        } else {
            None
        }
    }));
    let brain = Brain::new(mock.clone(), RESEARCH_SYSTEM_PROMPT)
        .with_retry(0, Duration::from_millis(1));
    (Arc::new(brain), mock)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

type SearchFn = Box<dyn Fn(&str) -> Result<Vec<SearchHit>, ProviderError> + Send + Sync>;

pub struct FnProvider {
    name: String,
    keyed: bool,
    handler: SearchFn,
    calls: AtomicUsize,
}

impl FnProvider {
    pub fn new<F>(name: &str, handler: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<Vec<SearchHit>, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            keyed: true,
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn keyless<F>(name: &str, handler: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<Vec<SearchHit>, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            keyed: false,
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    /// A provider that never finds anything.
    pub fn empty(name: &str) -> Arc<Self> {
        let owned = name.to_string();
        Self::new(name, move |_| Err(ProviderError::empty(owned.clone())))
    }

    /// A provider returning `n` hits under `https://<name>.example/<query>/<i>`.
    pub fn hits(name: &str, n: usize) -> Arc<Self> {
        let owned = name.to_string();
        Self::new(name, move |query| {
            Ok((0..n)
                .map(|i| {
                    SearchHit::new(
                        format!("{query} result {i}"),
                        format!("https://{owned}.example/{}/{i}", query.replace(' ', "-")),
                        "snippet",
                        owned.clone(),
                    )
                })
                .collect())
        })
    }

    pub fn failing(name: &str, kind: ProviderErrorKind) -> Arc<Self> {
        let owned = name.to_string();
        Self::new(name, move |_| Err(ProviderError::new(owned.clone(), kind, "scripted")))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_credentials(&self) -> bool {
        self.keyed
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(query).map(|mut hits| {
            hits.truncate(limit);
            hits
        })
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetcher serving text from a closure, with an optional delay per call.
pub struct StubFetcher {
    respond: Box<dyn Fn(&str, usize) -> Result<String, FetchError> + Send + Sync>,
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&str, usize) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Self::with_delay(respond, Duration::ZERO)
    }

    pub fn with_delay<F>(respond: F, delay: Duration) -> Arc<Self>
    where
        F: Fn(&str, usize) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    /// Every URL yields "page text for <url>".
    pub fn echo() -> Arc<Self> {
        Self::new(|url, _| Ok(format!("page text for {url}")))
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.respond)(url, n);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Records every callback and can post commands in reaction to events,
/// standing in for a user at the keyboard.
#[derive(Default)]
pub struct RecordingCallback {
    pub transitions: Mutex<Vec<(SessionState, SessionState)>>,
    pub focus_selected: Mutex<Vec<usize>>,
    pub notices: Mutex<Vec<String>>,
    pub evidence: Mutex<Vec<String>>,
    pub assessments: Mutex<Vec<Assessment>>,
    pub statuses: Mutex<Vec<SessionStatus>>,
    gate: Mutex<Option<CommandGate>>,
    on_search: Mutex<Option<Command>>,
    on_evidence: Mutex<Option<Command>>,
    on_assessment: Mutex<Option<Command>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, gate: CommandGate) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    /// Post `command` the first time a search resolves.
    pub fn post_on_first_search(&self, command: Command) {
        *self.on_search.lock().unwrap() = Some(command);
    }

    /// Post `command` the first time evidence is stored.
    pub fn post_on_first_evidence(&self, command: Command) {
        *self.on_evidence.lock().unwrap() = Some(command);
    }

    /// Post `command` the first time an assessment is shown.
    pub fn post_on_assessment(&self, command: Command) {
        *self.on_assessment.lock().unwrap() = Some(command);
    }

    pub fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn focus_selected(&self) -> Vec<usize> {
        self.focus_selected.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    fn post(&self, command: Option<Command>) {
        if let (Some(command), Some(gate)) = (command, self.gate.lock().unwrap().as_ref()) {
            gate.post(command);
        }
    }
}

impl ResearchCallback for RecordingCallback {
    fn on_state_change(&self, from: SessionState, to: SessionState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_focus_selected(&self, _cycle: u32, area: &FocusArea) {
        self.focus_selected.lock().unwrap().push(area.id);
    }

    fn on_search(&self, _query: &str, _hits: usize) {
        let command = self.on_search.lock().unwrap().take();
        self.post(command);
    }

    fn on_notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn on_evidence(&self, entry: &EvidenceEntry) {
        self.evidence.lock().unwrap().push(entry.url.clone());
        let command = self.on_evidence.lock().unwrap().take();
        self.post(command);
    }

    fn on_status(&self, status: &SessionStatus) {
        self.statuses.lock().unwrap().push(status.clone());
    }

    fn on_assessment(&self, assessment: &Assessment) {
        self.assessments.lock().unwrap().push(assessment.clone());
        let command = self.on_assessment.lock().unwrap().take();
        self.post(command);
    }
}
