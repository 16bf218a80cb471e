//! Prompt templates for every LLM call in the research loop, and the
//! parsers for their replies.
//!
//! Each template opens with a distinct instruction phrase so logs (and test
//! doubles) can tell the calls apart.

use crate::search::SearchHit;
use crate::text::{strip_list_marker, truncate_chars};
use serde::{Deserialize, Serialize};

pub const PLAN_MARKER: &str = "Propose exactly";
pub const QUERIES_MARKER: &str = "web search queries";
pub const SELECT_MARKER: &str = "numbered search results";
pub const ASSESS_MARKER: &str = "Does the evidence gathered so far answer";
pub const SUMMARY_MARKER: &str = "Write a final research summary";
pub const FOLLOWUP_MARKER: &str = "Follow-up question:";

/// Planner prompt. Evidence, when present, travels as context.
pub fn plan(query: &str, count: usize, existing: &[String], with_evidence: bool) -> String {
    let mut prompt = format!(
        "{PLAN_MARKER} {count} research focus areas for the topic below, most important first.\n\n\
         Topic: \"{query}\"\n\n\
         Each focus area is one specific sub-topic that web searches can investigate."
    );
    if with_evidence {
        prompt.push_str(
            "\nThe evidence collected so far is above. Build on it: cover gaps and follow \
             promising leads instead of repeating what is already known.",
        );
    }
    if !existing.is_empty() {
        prompt.push_str("\n\nAlready investigated (do not repeat):\n");
        for area in existing {
            prompt.push_str("- ");
            prompt.push_str(area);
            prompt.push('\n');
        }
    }
    prompt.push_str("\n\nRespond with a numbered list, one focus area per line.");
    prompt
}

/// Stricter planner prompt used for the single retry after an unparsable reply.
pub fn plan_strict(query: &str, count: usize) -> String {
    format!(
        "{PLAN_MARKER} {count} research focus areas for the topic \"{query}\".\n\n\
         Your previous answer could not be parsed. Respond with ONLY a JSON array of \
         {count} strings, for example:\n\
         [\"first focus area\", \"second focus area\"]\n\
         No prose, no markdown, nothing before or after the array."
    )
}

pub fn queries(query: &str, focus_area: &str, count: usize, already_used: &[String]) -> String {
    let mut prompt = format!(
        "Write {count} {QUERIES_MARKER} to investigate this focus area.\n\n\
         Research topic: \"{query}\"\n\
         Focus area: \"{focus_area}\"\n"
    );
    if !already_used.is_empty() {
        prompt.push_str("\nQueries already used for this area (write different ones):\n");
        for q in already_used {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
    }
    prompt.push_str(
        "\nKeep each query short and specific, as you would type it into a search engine. \
         Respond with one query per line and nothing else.",
    );
    prompt
}

pub fn select(query: &str, focus_area: &str, candidates: &[SearchHit], count: usize) -> String {
    let mut listing = String::new();
    for (i, hit) in candidates.iter().enumerate() {
        listing.push_str(&format!(
            "{}. Title: {}\n   Snippet: {}\n   URL: {}\n",
            i + 1,
            hit.title,
            truncate_chars(&hit.snippet, 200),
            hit.url
        ));
    }
    format!(
        "Select up to {count} of the {SELECT_MARKER} below that are most likely to contain \
         substantive information on the focus area.\n\n\
         Research topic: \"{query}\"\n\
         Focus area: \"{focus_area}\"\n\n\
         Search Results:\n{listing}\n\
         Respond using EXACTLY this format:\n\
         Selected Results: [comma-separated result numbers]\n\
         Reasoning: [one sentence]"
    )
}

pub fn assess(query: &str) -> String {
    format!(
        "{ASSESS_MARKER} the research topic \"{query}\" well enough to write a complete, \
         well-sourced answer?\n\n\
         Start your reply with \"Yes\" or \"No\", then explain in two or three sentences \
         what is covered and what is still missing."
    )
}

pub fn summary(query: &str) -> String {
    format!(
        "{SUMMARY_MARKER} that answers the topic \"{query}\" using only the evidence above.\n\n\
         Instructions:\n\
         1. Organize the answer by theme, not by source.\n\
         2. Cite sources with their bracketed numbers, e.g. [2].\n\
         3. If the evidence does not fully answer the topic, say what is missing.\n\
         4. Do not invent facts or sources that are not in the evidence."
    )
}

pub fn followup(query: &str, question: &str, history: &str) -> String {
    let mut prompt = format!(
        "Answer the user's follow-up question about the research topic \"{query}\" using only \
         the evidence above. Cite sources with their bracketed numbers. If the evidence does \
         not cover the question, say so plainly.\n"
    );
    if !history.is_empty() {
        prompt.push_str("\nEarlier in this conversation:\n");
        prompt.push_str(history);
        prompt.push('\n');
    }
    prompt.push('\n');
    prompt.push_str(FOLLOWUP_MARKER);
    prompt.push(' ');
    prompt.push_str(question);
    prompt
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Search queries from a one-per-line reply, deduplicated, at most `max`.
pub fn parse_queries(reply: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in reply.lines() {
        let q = strip_list_marker(line);
        if q.is_empty() || q.ends_with(':') || q.len() > 300 {
            continue;
        }
        if !out.iter().any(|existing| existing.eq_ignore_ascii_case(q)) {
            out.push(q.to_string());
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

/// Zero-based candidate indices named in a selection reply.
///
/// Reads the `Selected Results:` line when present, otherwise the first
/// non-empty line. Out-of-range and repeated numbers are ignored.
pub fn parse_selection(reply: &str, candidates: usize, max: usize) -> Vec<usize> {
    let line = reply
        .lines()
        .find(|l| l.to_lowercase().contains("selected"))
        .map(|l| l.split_once(':').map_or(l, |(_, rest)| rest))
        .or_else(|| reply.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("");

    let mut picked = Vec::new();
    for n in line
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse::<usize>().ok())
    {
        if (1..=candidates).contains(&n) && !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
        if picked.len() >= max {
            break;
        }
    }
    picked
}

/// The LLM's judgement of whether the evidence answers the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub sufficient: bool,
    pub explanation: String,
}

impl Assessment {
    /// Parse a reply that leads with yes or no.
    pub fn parse(reply: &str) -> Self {
        let trimmed = reply.trim();
        let first = trimmed
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .unwrap_or("")
            .to_lowercase();
        let sufficient = matches!(first.as_str(), "yes" | "sufficient");
        let explanation = if matches!(first.as_str(), "yes" | "no" | "sufficient") {
            trimmed
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .get(first.len()..)
                .unwrap_or("")
                .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
                .to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            sufficient,
            explanation,
        }
    }
}
