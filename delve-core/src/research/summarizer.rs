//! Final synthesis and grounded follow-up Q&A.
//!
//! Both work from one digest frozen when the session enters Summarizing, so
//! every answer in a conversation sees the same evidence.

use super::digest::Digest;
use super::prompts;
use crate::brain::Brain;
use crate::text::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Reply used for both the summary and Q&A when nothing was collected.
pub const NO_EVIDENCE: &str = "No evidence collected.";

/// History answers are cut to this many characters when replayed.
const HISTORY_ANSWER_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    /// Cited source URLs in digest order.
    pub sources: Vec<String>,
    pub evidence_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    pub fn is_empty_evidence(&self) -> bool {
        self.evidence_count == 0
    }
}

pub struct Summarizer {
    brain: Arc<Brain>,
}

impl Summarizer {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Synthesize an answer to `query` from `digest`.
    ///
    /// Always returns a summary: an empty digest is reported as "no evidence
    /// collected" without calling the LLM, and an LLM failure falls back to a
    /// plain notice listing the sources.
    pub async fn summarize(&self, query: &str, digest: &Digest, evidence_count: usize) -> Summary {
        let text = if digest.is_empty() {
            format!("{NO_EVIDENCE} The research on \"{query}\" did not gather any source material, so no grounded summary can be given.")
        } else {
            match self.brain.generate(&prompts::summary(query), &digest.text).await {
                Ok(text) if !text.is_empty() => text,
                Ok(_) => fallback_text(evidence_count, "the model returned an empty reply"),
                Err(e) => {
                    warn!(error = %e, "Summary generation failed");
                    fallback_text(evidence_count, &e.to_string())
                }
            }
        };
        info!(evidence_count, sources = digest.sources.len(), "Summary produced");
        Summary {
            text,
            sources: digest.sources.clone(),
            evidence_count,
            generated_at: Utc::now(),
        }
    }
}

fn fallback_text(evidence_count: usize, reason: &str) -> String {
    format!(
        "A summary could not be generated ({reason}). {evidence_count} evidence entries were \
         collected; they are listed in the research log with their sources."
    )
}

/// Follow-up Q&A over the frozen digest.
pub struct ConversationEngine {
    brain: Arc<Brain>,
    query: String,
    digest: Digest,
    summary: Summary,
    history: VecDeque<(String, String)>,
    max_history: usize,
    turns: usize,
}

impl ConversationEngine {
    pub fn new(
        brain: Arc<Brain>,
        query: impl Into<String>,
        digest: Digest,
        summary: Summary,
        max_history: usize,
    ) -> Self {
        Self {
            brain,
            query: query.into(),
            digest,
            summary,
            history: VecDeque::new(),
            max_history,
            turns: 0,
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Answer `question` from the digest and recent conversation turns.
    pub async fn ask(&mut self, question: &str) -> String {
        self.turns += 1;
        let question = question.trim();
        if self.digest.is_empty() {
            return format!(
                "{NO_EVIDENCE} There is nothing from this research session to answer \"{question}\" with."
            );
        }

        let history = self
            .history
            .iter()
            .map(|(q, a)| format!("Q: {q}\nA: {}", truncate_chars(a, HISTORY_ANSWER_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::followup(&self.query, question, &history);

        let answer = match self.brain.generate(&prompt, &self.digest.text).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Follow-up answer failed");
                return format!("Sorry, I couldn't answer that: {e}");
            }
        };

        if self.max_history > 0 {
            self.history.push_back((question.to_string(), answer.clone()));
            while self.history.len() > self.max_history {
                self.history.pop_front();
            }
        }
        answer
    }
}
