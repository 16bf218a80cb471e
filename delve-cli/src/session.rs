//! Interactive research session: steering commands while research runs,
//! then follow-up questions against the collected evidence.

use crate::console::{self, ConsoleCallback};
use delve_core::brain::{Brain, RESEARCH_SYSTEM_PROMPT};
use delve_core::config::DelveConfig;
use delve_core::providers::create_provider;
use delve_core::research::{Command, CycleController};
use delve_tools::{HttpFetcher, build_fallback_chain};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Words that end the follow-up conversation.
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Run one session to completion.
pub(crate) async fn run(
    config: DelveConfig,
    query: Option<String>,
    chat: bool,
) -> anyhow::Result<()> {
    let mut lines = spawn_stdin_reader();

    let query = match query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()) {
        Some(query) => query,
        None => match read_query(&mut lines).await {
            Some(query) => query,
            None => {
                console::print_info("No research question given.");
                return Ok(());
            }
        },
    };

    let provider = create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to initialize LLM provider: {}", e))?;
    let brain = Brain::new(provider, RESEARCH_SYSTEM_PROMPT)
        .with_context_budget(config.research.context_budget_chars)
        .with_retry(
            config.llm.max_retries,
            Duration::from_millis(config.llm.retry_base_delay_ms),
        )
        .with_sampling(config.llm.temperature, Some(config.llm.top_p))
        .with_max_tokens(config.llm.max_tokens);

    let chain = build_fallback_chain(&config.search)?;
    let fetcher = HttpFetcher::new(&config.scraper)?;
    let log_dir = config.output.resolve_log_dir();

    let mut ctl = CycleController::new(
        query.clone(),
        config.research.clone(),
        Arc::new(brain),
        chain,
        Arc::new(fetcher),
    )
    .with_callback(Arc::new(ConsoleCallback))
    .with_log_dir(&log_dir)
    .with_snapshot_dir(log_dir.clone());
    let gate = ctl.gate();

    println!("{}", console::banner(&query));
    console::print_controls();

    let mut stdin_open = true;
    let mut steering = Steering::default();
    let reason = {
        let research = ctl.run();
        tokio::pin!(research);
        loop {
            tokio::select! {
                result = &mut research => break result?,
                line = lines.recv(), if stdin_open => match line {
                    Some(line) => match Command::parse(&line) {
                        Some(command) => {
                            debug!(?command, "Command received");
                            steering.record(command);
                            gate.post(command);
                        }
                        None if line.trim().is_empty() => {}
                        None => console::print_warning(&format!(
                            "Unknown command '{}'. Use status, focus, pause, continue or quit.",
                            line.trim()
                        )),
                    },
                    None => {
                        stdin_open = false;
                        if let Some(command) = steering.on_input_closed() {
                            info!(%command, "Input closed while paused");
                            gate.post(command);
                        }
                    }
                },
            }
        }
    };
    info!(%reason, "Research phase ended");
    console::print_info(&format!("\nResearch ended: {reason}."));

    let mut conversation = ctl.summarize().await?;
    console::print_summary(conversation.summary());

    if chat && stdin_open {
        console::print_info("\nAsk follow-up questions about the findings (exit to finish).");
        loop {
            console::prompt("> ");
            let Some(line) = lines.recv().await else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
                break;
            }
            let answer = conversation.ask(question).await;
            console::print_answer(&answer);
        }
    }

    ctl.terminate()?;
    if let Some(path) = ctl.log_path() {
        console::print_info(&format!("Research log: {}", path.display()));
    }
    if let Some(path) = ctl.snapshot_path() {
        console::print_info(&format!("Session snapshot: {}", path.display()));
    }
    Ok(())
}

/// What the user last asked of the research loop.
#[derive(Debug, Default)]
struct Steering {
    paused: bool,
}

impl Steering {
    fn record(&mut self, command: Command) {
        match command {
            Command::Pause => self.paused = true,
            Command::Continue | Command::Quit => self.paused = false,
            Command::Status | Command::Focus => {}
        }
    }

    /// Command to post once input is closed. A paused session can no longer
    /// be resumed, so it is ended and summarized.
    fn on_input_closed(&self) -> Option<Command> {
        self.paused.then_some(Command::Quit)
    }
}

/// Forward stdin lines into a channel.
///
/// Runs on a plain thread: a blocking read must not hold the runtime open
/// when the session ends.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn read_query(lines: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
    loop {
        console::prompt("What should I research? ");
        let line = lines.recv().await?;
        let query = line.trim();
        if !query.is_empty() {
            return Some(query.to_string());
        }
    }
}
