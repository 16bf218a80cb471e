//! End-to-end research sessions against in-process doubles.
//!
//! Each test drives a `CycleController` from planning through summary with
//! a routed mock LLM, scripted search providers and a stub fetcher.

mod common;

use common::{FnProvider, RecordingCallback, StubFetcher, research_brain};
use delve_core::config::ResearchConfig;
use delve_core::error::ProviderErrorKind;
use delve_core::research::summarizer::NO_EVIDENCE;
use delve_core::research::{Command, CycleController, SessionSnapshot, SessionState, StopReason};
use delve_core::search::{ChainSettings, ProviderFallbackChain, ProviderHealth, SearchHit};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FIVE_AREAS: [&str; 5] = ["history", "mechanism", "costs", "risks", "outlook"];

fn config(queries_per_area: usize, queries_per_step: usize) -> ResearchConfig {
    ResearchConfig {
        queries_per_area,
        queries_per_step,
        ..ResearchConfig::default()
    }
}

fn chain() -> ProviderFallbackChain {
    ProviderFallbackChain::new(ChainSettings {
        call_timeout: Duration::from_secs(2),
        ..ChainSettings::default()
    })
}

#[tokio::test]
async fn no_results_anywhere_still_summarizes() {
    let dir = TempDir::new().unwrap();
    let (brain, mock) = research_brain(&FIVE_AREAS);
    let chain = chain()
        .with_provider(FnProvider::empty("brave"))
        .with_provider(FnProvider::empty("exa"))
        .with_fallback(FnProvider::keyless("duckduckgo", |_| Ok(vec![])));
    let fetcher = StubFetcher::echo();
    let callback = RecordingCallback::new();

    let mut ctl = CycleController::new("X", config(1, 1), brain, chain, fetcher.clone())
        .with_callback(callback.clone())
        .with_log_dir(dir.path())
        .with_snapshot_dir(dir.path());

    let reason = ctl.run().await.unwrap();
    assert_eq!(reason, StopReason::PlannerExhausted);
    assert_eq!(ctl.state(), SessionState::Summarizing);
    assert_eq!(ctl.board().len(), 5);
    assert!(ctl.board().all_exhausted());
    assert!(ctl.store().is_empty());
    assert_eq!(fetcher.started(), 0);

    let exhausted = callback
        .notices()
        .iter()
        .filter(|n| n.contains("All search providers exhausted"))
        .count();
    assert_eq!(exhausted, 5);

    let chat = ctl.summarize().await.unwrap();
    assert_eq!(ctl.state(), SessionState::Conversing);
    assert!(chat.summary().text.starts_with(NO_EVIDENCE));
    assert_eq!(chat.summary().evidence_count, 0);
    assert!(
        !mock
            .prompts()
            .iter()
            .any(|p| p.contains(delve_core::research::prompts::SUMMARY_MARKER))
    );

    let log = std::fs::read_to_string(ctl.log_path().unwrap()).unwrap();
    assert!(!log.contains("[Entry 1]"));
    assert!(log.contains(NO_EVIDENCE));

    let snapshot = SessionSnapshot::load(ctl.snapshot_path().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.session.state, SessionState::Conversing);
    assert_eq!(snapshot.focus_areas.len(), 5);
    assert!(snapshot.evidence.is_empty());

    ctl.terminate().unwrap();
    assert_eq!(ctl.state(), SessionState::Terminated);
}

#[tokio::test]
async fn identical_content_is_stored_once_with_first_provenance() {
    let dir = TempDir::new().unwrap();
    let (brain, _) = research_brain(&["alpha", "beta"]);
    let chain = chain().with_provider(FnProvider::new("exa", |_| {
        Ok(vec![SearchHit::new(
            "The page",
            "https://same.example/page",
            "s",
            "exa",
        )])
    }));
    // Each fetch of the page differs only in whitespace layout.
    let fetcher = StubFetcher::new(|_, n| {
        Ok(format!(
            "Heat pumps{}retain efficiency\nbelow freezing.",
            " ".repeat(n + 1)
        ))
    });

    let mut ctl = CycleController::new("heat pumps", config(1, 1), brain, chain, fetcher.clone())
        .with_log_dir(dir.path());
    ctl.run().await.unwrap();

    assert_eq!(fetcher.started(), 2);
    assert_eq!(ctl.store().len(), 1);
    let entry = &ctl.store().all()[0];
    assert_eq!(entry.source_query, "alpha query");
    assert_eq!(entry.focus_area_id, 0);

    let log = std::fs::read_to_string(ctl.log_path().unwrap()).unwrap();
    assert_eq!(log.matches("[Entry ").count(), 1);
}

#[tokio::test]
async fn continue_resumes_the_same_focus_area() {
    let (brain, _) = research_brain(&["alpha", "beta"]);
    let chain = chain().with_provider(FnProvider::hits("brave", 3));
    let callback = RecordingCallback::new();

    let mut ctl = CycleController::new("topic", config(4, 2), brain, chain, StubFetcher::echo())
        .with_callback(callback.clone());
    callback.attach(ctl.gate());
    callback.post_on_first_evidence(Command::Pause);
    callback.post_on_assessment(Command::Continue);

    ctl.run().await.unwrap();

    let transitions = callback.transitions();
    let paused = transitions
        .iter()
        .position(|t| *t == (SessionState::Researching, SessionState::Paused))
        .expect("session was paused");
    assert_eq!(
        transitions[paused + 1],
        (SessionState::Paused, SessionState::Researching)
    );

    let assessments = callback.assessments.lock().unwrap().clone();
    assert_eq!(assessments.len(), 1);
    assert!(!assessments[0].sufficient);

    // alpha still had query budget, so the step after the pause resumed it
    let focus = callback.focus_selected();
    assert_eq!(&focus[..2], &[0, 0]);
    assert!(focus.contains(&1));
}

#[tokio::test]
async fn quit_is_honored_at_the_next_checkpoint_never_mid_fetch() {
    let (brain, _) = research_brain(&FIVE_AREAS);
    let chain = chain().with_provider(FnProvider::hits("brave", 3));
    let fetcher = StubFetcher::with_delay(
        |url, _| Ok(format!("text of {url}")),
        Duration::from_millis(50),
    );
    let callback = RecordingCallback::new();

    let mut ctl = CycleController::new("topic", config(4, 2), brain, chain, fetcher.clone())
        .with_callback(callback.clone());
    callback.attach(ctl.gate());
    callback.post_on_first_search(Command::Quit);

    let reason = ctl.run().await.unwrap();
    assert_eq!(reason, StopReason::UserQuit);
    assert_eq!(ctl.state(), SessionState::Summarizing);
    assert_eq!(ctl.session().cycle, 1);
    // the step that saw the quit finished all of its fetches
    assert_eq!(fetcher.started(), 3);
    assert_eq!(fetcher.completed(), 3);
    assert_eq!(ctl.store().len(), 3);
}

#[tokio::test]
async fn quit_posted_from_another_task_stops_within_one_step() {
    let (brain, _) = research_brain(&FIVE_AREAS);
    let chain = chain().with_provider(FnProvider::hits("brave", 3));
    let fetcher = StubFetcher::with_delay(
        |url, _| Ok(format!("text of {url}")),
        Duration::from_millis(40),
    );

    let mut ctl = CycleController::new("topic", config(100, 2), brain, chain, fetcher.clone());
    let gate = ctl.gate();
    let quitter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        gate.post(Command::Quit);
    });

    let start = Instant::now();
    let reason = ctl.run().await.unwrap();
    quitter.await.unwrap();

    assert_eq!(reason, StopReason::UserQuit);
    assert_eq!(fetcher.started(), fetcher.completed());
    // one step is three 40ms fetches; the quit lands inside the first step
    assert!(ctl.session().cycle <= 2);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn pause_then_quit_goes_to_summarizing() {
    let (brain, _) = research_brain(&["alpha"]);
    let chain = chain().with_provider(FnProvider::hits("brave", 2));
    let callback = RecordingCallback::new();

    let mut ctl = CycleController::new("topic", config(4, 1), brain, chain, StubFetcher::echo())
        .with_callback(callback.clone());
    callback.attach(ctl.gate());
    callback.post_on_first_evidence(Command::Pause);
    callback.post_on_assessment(Command::Quit);

    assert_eq!(ctl.run().await.unwrap(), StopReason::UserQuit);
    assert_eq!(
        callback.transitions().last().copied(),
        Some((SessionState::Paused, SessionState::Summarizing))
    );

    let mut chat = ctl.summarize().await.unwrap();
    assert_eq!(chat.summary().text, "Synthesized answer [1].");
    assert_eq!(chat.ask("and then?").await, "Follow-up answer [1].");
}

#[tokio::test]
async fn status_command_reports_without_stopping() {
    let (brain, _) = research_brain(&["alpha", "beta"]);
    let chain = chain().with_provider(FnProvider::hits("brave", 1));
    let callback = RecordingCallback::new();

    let mut ctl = CycleController::new("topic", config(1, 1), brain, chain, StubFetcher::echo())
        .with_callback(callback.clone());
    callback.attach(ctl.gate());
    callback.post_on_first_evidence(Command::Status);

    assert_eq!(ctl.run().await.unwrap(), StopReason::PlannerExhausted);
    let statuses = callback.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, SessionState::Researching);
    assert_eq!(statuses[0].evidence_count, 1);
    assert_eq!(ctl.store().len(), 2);
}

#[tokio::test]
async fn rate_limited_primary_is_demoted_and_research_continues() {
    let (brain, _) = research_brain(&FIVE_AREAS);
    let primary = FnProvider::failing("brave", ProviderErrorKind::RateLimited);
    let secondary = FnProvider::hits("exa", 2);
    let chain = chain()
        .with_provider(primary.clone())
        .with_provider(secondary.clone());

    let mut ctl = CycleController::new("topic", config(1, 1), brain, chain, StubFetcher::echo());
    ctl.run().await.unwrap();

    // exa is promoted after its first success, so brave is tried once
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 5);
    assert_eq!(ctl.chain().order(), vec!["exa", "brave"]);
    assert_eq!(ctl.store().len(), 10);
    assert_ne!(
        ctl.chain().state("exa").unwrap().health,
        ProviderHealth::Disabled
    );
}

#[tokio::test]
async fn planning_failure_still_produces_a_summary() {
    let mock = Arc::new(delve_core::brain::MockLlmProvider::with_response("Sorry."));
    let brain = Arc::new(
        delve_core::brain::Brain::new(mock, "sys").with_retry(0, Duration::from_millis(1)),
    );
    let mut ctl = CycleController::new(
        "topic",
        ResearchConfig::default(),
        brain,
        chain().with_provider(FnProvider::hits("brave", 1)),
        StubFetcher::echo(),
    );

    let reason = ctl.run().await.unwrap();
    assert!(matches!(reason, StopReason::PlanningFailed(_)));
    assert_eq!(ctl.state(), SessionState::Summarizing);
    let chat = ctl.summarize().await.unwrap();
    assert!(chat.summary().text.starts_with(NO_EVIDENCE));
}
