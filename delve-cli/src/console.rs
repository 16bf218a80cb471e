//! Terminal rendering of research progress.

use delve_core::research::{
    Assessment, EvidenceEntry, FocusArea, ResearchCallback, SessionState, SessionStatus, Summary,
};
use delve_core::search::ProviderHealth;
use delve_core::text::{char_len, truncate_chars};
use std::io::{self, Write};

const DIM: &str = "\x1b[90m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Prints callbacks from the research loop as status lines on stdout.
pub(crate) struct ConsoleCallback;

impl ResearchCallback for ConsoleCallback {
    fn on_state_change(&self, from: SessionState, to: SessionState) {
        println!("{DIM}  [{from} -> {to}]{RESET}");
        if to == SessionState::Paused {
            println!("{YELLOW}  Paused.{RESET} Type [c]ontinue or [q]uit (s/f also work).");
        }
    }

    fn on_plan(&self, round: u32, areas: &[FocusArea]) {
        println!("\n{CYAN}Planning round {round}{RESET}: {} new focus areas", areas.len());
        for area in areas {
            println!("  {}. {}", area.id + 1, area.description);
        }
    }

    fn on_focus_selected(&self, cycle: u32, area: &FocusArea) {
        println!(
            "\n{BOLD}Cycle {cycle}{RESET} {DIM}focus #{}:{RESET} {}",
            area.id + 1,
            area.description
        );
    }

    fn on_search(&self, query: &str, hits: usize) {
        println!("{DIM}  search \"{query}\" -> {hits} results{RESET}");
    }

    fn on_notice(&self, message: &str) {
        println!("{YELLOW}  ! {message}{RESET}");
    }

    fn on_evidence(&self, entry: &EvidenceEntry) {
        println!(
            "{GREEN}  + {}{RESET} {DIM}({} chars){RESET}",
            entry.url,
            char_len(&entry.text)
        );
    }

    fn on_status(&self, status: &SessionStatus) {
        println!("\n{}", format_status(status));
    }

    fn on_focus_report(&self, area: Option<&FocusArea>) {
        match area {
            Some(area) => println!(
                "\n{CYAN}Current focus{RESET}: {} (priority {}, {} queries issued, {})",
                area.description, area.priority, area.queries_issued, area.status
            ),
            None => println!("\n{CYAN}Current focus{RESET}: none yet"),
        }
    }

    fn on_assessment(&self, assessment: &Assessment) {
        let verdict = if assessment.sufficient {
            format!("{GREEN}evidence looks sufficient{RESET}")
        } else {
            format!("{YELLOW}more research needed{RESET}")
        };
        println!("\n{BOLD}Assessment{RESET}: {verdict}");
        if !assessment.explanation.is_empty() {
            println!("  {}", assessment.explanation);
        }
    }
}

/// Multi-line report for the `status` command.
pub(crate) fn format_status(status: &SessionStatus) -> String {
    let mut out = format!(
        "{BOLD}Status{RESET} {DIM}session {}{RESET}\n  state: {}  cycle: {}  planning rounds: {}\n",
        status.session_id, status.state, status.cycle, status.planning_rounds
    );
    match &status.current_focus {
        Some(area) => out.push_str(&format!("  focus: {}\n", area.description)),
        None => out.push_str("  focus: none\n"),
    }
    out.push_str(&format!(
        "  focus areas: {} active, {} exhausted\n  evidence: {} entries, {} chars\n  providers:",
        status.areas_active, status.areas_exhausted, status.evidence_count, status.evidence_chars
    ));
    for provider in &status.providers {
        let color = match provider.health {
            ProviderHealth::Healthy => GREEN,
            ProviderHealth::Degraded | ProviderHealth::RateLimited => YELLOW,
            ProviderHealth::Disabled => RED,
        };
        out.push_str(&format!(
            " {}{}{RESET} ({})",
            color, provider.name, provider.health
        ));
    }
    out
}

pub(crate) fn print_controls() {
    println!(
        "{DIM}Commands while researching: [s]tatus  [f]ocus  [p]ause  [q]uit  (then Enter){RESET}"
    );
}

pub(crate) fn print_summary(summary: &Summary) {
    println!("\n{BOLD}{GREEN}Summary{RESET}\n");
    println!("{}", summary.text.trim());
    if !summary.sources.is_empty() {
        println!("\n{BOLD}Sources{RESET}");
        for (i, url) in summary.sources.iter().enumerate() {
            println!("  [{}] {url}", i + 1);
        }
    }
}

pub(crate) fn print_answer(answer: &str) {
    println!("\n{GREEN}Delve:{RESET} {}\n", answer.trim());
}

pub(crate) fn print_warning(message: &str) {
    eprintln!("{YELLOW}warning:{RESET} {message}");
}

pub(crate) fn print_info(message: &str) {
    println!("{DIM}{message}{RESET}");
}

/// Print `label` without a newline and flush so it shows before input.
pub(crate) fn prompt(label: &str) {
    print!("{CYAN}{label}{RESET}");
    let _ = io::stdout().flush();
}

/// Shorten a query for the banner.
pub(crate) fn banner(query: &str) -> String {
    let short = truncate_chars(query, 80);
    if short.len() < query.len() {
        format!("{BOLD}Researching:{RESET} {short}...")
    } else {
        format!("{BOLD}Researching:{RESET} {short}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::research::FocusStatus;
    use delve_core::search::ProviderState;
    use uuid::Uuid;

    fn status() -> SessionStatus {
        SessionStatus {
            session_id: Uuid::new_v4(),
            state: SessionState::Researching,
            cycle: 4,
            planning_rounds: 1,
            current_focus: Some(FocusArea {
                id: 2,
                description: "installation costs".into(),
                priority: 3,
                status: FocusStatus::InProgress,
                originating_cycle: 0,
                queries_issued: 2,
            }),
            areas_active: 3,
            areas_exhausted: 2,
            evidence_count: 7,
            evidence_chars: 12_345,
            providers: vec![],
        }
    }

    #[test]
    fn test_format_status() {
        let text = format_status(&status());
        assert!(text.contains("state: researching"));
        assert!(text.contains("cycle: 4"));
        assert!(text.contains("focus: installation costs"));
        assert!(text.contains("3 active, 2 exhausted"));
        assert!(text.contains("7 entries, 12345 chars"));
    }

    #[test]
    fn test_format_status_lists_provider_health() {
        let mut s = status();
        s.current_focus = None;
        s.providers = vec![ProviderState {
            name: "brave".into(),
            health: ProviderHealth::Disabled,
            consecutive_failures: 2,
            limit_failures: 2,
            last_success: None,
            empty_results: 0,
            requires_credentials: true,
        }];
        let text = format_status(&s);
        assert!(text.contains("focus: none"));
        assert!(text.contains(&format!("{RED}brave{RESET} (disabled)")));
    }

    #[test]
    fn test_banner_truncates_long_queries() {
        let long = "why ".repeat(40);
        assert!(banner(&long).ends_with("..."));
        assert!(!banner("short question").ends_with("..."));
    }
}
