//! Focus-area planner.
//!
//! Asks the LLM for a fixed number of sub-topics, first from the query alone
//! and on later rounds from the query plus a budgeted evidence digest. One
//! retry with a stricter prompt is allowed before planning fails.

use super::digest::{build_digest, evidence_budget};
use super::evidence::EvidenceEntry;
use super::focus::FocusBoard;
use super::prompts;
use crate::brain::Brain;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::text::strip_list_marker;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FocusPlanner {
    brain: Arc<Brain>,
    areas_per_round: usize,
    min_entry_chars: usize,
}

impl FocusPlanner {
    pub fn new(brain: Arc<Brain>, config: &ResearchConfig) -> Self {
        Self {
            brain,
            areas_per_round: config.focus_areas_per_round.max(1),
            min_entry_chars: config.min_entry_chars,
        }
    }

    /// Plan one round and append it to `board`.
    ///
    /// Returns the ids of the newly added areas. An empty result means the
    /// LLM only proposed areas the board already has.
    pub async fn plan_round(
        &self,
        query: &str,
        evidence: &[EvidenceEntry],
        board: &mut FocusBoard,
        cycle: u32,
    ) -> Result<Vec<usize>, ResearchError> {
        let context = if evidence.is_empty() {
            String::new()
        } else {
            let budget = evidence_budget(self.brain.context_budget());
            build_digest(evidence, board, budget, self.min_entry_chars).text
        };
        let existing: Vec<String> = board.areas().iter().map(|a| a.description.clone()).collect();

        let prompt = prompts::plan(query, self.areas_per_round, &existing, !evidence.is_empty());
        let mut proposed = match self.brain.generate(&prompt, &context).await {
            Ok(reply) => parse_focus_areas(&reply, self.areas_per_round),
            Err(e) => {
                warn!(error = %e, "Planner LLM call failed");
                Vec::new()
            }
        };

        if proposed.is_empty() {
            debug!(cycle, "Planner reply unparsable, retrying with strict prompt");
            let strict = prompts::plan_strict(query, self.areas_per_round);
            let reply = self
                .brain
                .generate(&strict, &context)
                .await
                .map_err(|e| ResearchError::PlanningFailed {
                    message: format!("LLM error on retry: {e}"),
                })?;
            proposed = parse_focus_areas(&reply, self.areas_per_round);
            if proposed.is_empty() {
                return Err(ResearchError::PlanningFailed {
                    message: "planner reply could not be parsed into focus areas".to_string(),
                });
            }
        }

        let fresh: Vec<String> = proposed
            .into_iter()
            .filter(|d| !board.contains_description(d))
            .collect();
        let ids = board.add_round(fresh, cycle);
        info!(cycle, new_areas = ids.len(), total = board.len(), "Planned focus areas");
        Ok(ids)
    }
}

/// Focus-area descriptions from a planner reply, at most `max`.
///
/// Accepts a JSON array (of strings, or of objects with a `description`,
/// `focus_area`, `area` or `title` field) anywhere in the reply, or a
/// numbered/bulleted list. A lone line of prose is not a plan.
pub fn parse_focus_areas(reply: &str, max: usize) -> Vec<String> {
    let mut areas = parse_json_array(reply).unwrap_or_else(|| parse_list(reply));
    let mut seen = Vec::<String>::new();
    areas.retain(|a| {
        let key = a.to_lowercase();
        if a.is_empty() || seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
    areas.truncate(max);
    areas
}

fn parse_json_array(reply: &str) -> Option<Vec<String>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&reply[start..=end]).ok()?;
    let items = value.as_array()?;
    let areas: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => ["description", "focus_area", "area", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .collect();
    (!areas.is_empty()).then_some(areas)
}

fn parse_list(reply: &str) -> Vec<String> {
    let lines: Vec<(&str, bool)> = reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.ends_with(':'))
        .map(|l| {
            let stripped = strip_list_marker(l);
            let marked = l.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '•'));
            (stripped, marked)
        })
        .filter(|(s, _)| !s.is_empty() && s.len() <= 300)
        .collect();

    let any_marked = lines.iter().any(|(_, m)| *m);
    if any_marked {
        lines
            .into_iter()
            .filter(|(_, m)| *m)
            .map(|(s, _)| s.to_string())
            .collect()
    } else if lines.len() >= 2 {
        lines.into_iter().map(|(s, _)| s.to_string()).collect()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{MockLlmProvider, RESEARCH_SYSTEM_PROMPT};
    use crate::error::LlmError;
    use std::time::Duration;

    fn planner(mock: Arc<MockLlmProvider>, areas: usize) -> FocusPlanner {
        let brain = Brain::new(mock, RESEARCH_SYSTEM_PROMPT).with_retry(0, Duration::from_millis(1));
        let config = ResearchConfig {
            focus_areas_per_round: areas,
            ..ResearchConfig::default()
        };
        FocusPlanner::new(Arc::new(brain), &config)
    }

    #[test]
    fn test_parse_numbered_list_with_preamble() {
        let reply = "Here are the focus areas:\n1. Cell chemistry\n2. **Manufacturing cost**\n3) Safety record\nThese cover the topic.";
        assert_eq!(
            parse_focus_areas(reply, 5),
            vec!["Cell chemistry", "Manufacturing cost", "Safety record"]
        );
    }

    #[test]
    fn test_parse_json_variants() {
        assert_eq!(
            parse_focus_areas(r#"```json
["a", "b", "a"]
```"#, 5),
            vec!["a", "b"]
        );
        assert_eq!(
            parse_focus_areas(r#"[{"description": "x"}, {"title": "y"}, 3]"#, 5),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_prose_is_not_a_plan() {
        assert!(parse_focus_areas("I'm a mock LLM. No queued responses available.", 5).is_empty());
        assert!(parse_focus_areas("", 5).is_empty());
    }

    #[test]
    fn test_parse_truncates_to_max() {
        let reply = "- a\n- b\n- c\n- d";
        assert_eq!(parse_focus_areas(reply, 2), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_first_round_from_query_only() {
        let mock = Arc::new(MockLlmProvider::with_response("1. A\n2. B\n3. C\n4. D\n5. E"));
        let planner = planner(mock.clone(), 5);
        let mut board = FocusBoard::new();

        let ids = planner.plan_round("topic", &[], &mut board, 1).await.unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(board.next_open().unwrap().description, "A");
        let prompt = &mock.prompts()[0];
        assert!(prompt.starts_with(prompts::PLAN_MARKER));
    }

    #[tokio::test]
    async fn test_retry_with_strict_prompt() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_response(MockLlmProvider::text_response("Sure, happy to help."));
        mock.queue_response(MockLlmProvider::text_response(r#"["one", "two"]"#));
        let planner = planner(mock.clone(), 2);
        let mut board = FocusBoard::new();

        let ids = planner.plan_round("topic", &[], &mut board, 1).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(mock.prompts().len(), 2);
        assert!(mock.prompts()[1].contains("JSON array"));
    }

    #[tokio::test]
    async fn test_fails_after_one_retry() {
        let mock = Arc::new(MockLlmProvider::with_response("No."));
        let planner = planner(mock.clone(), 3);
        let mut board = FocusBoard::new();

        let err = planner.plan_round("topic", &[], &mut board, 1).await.unwrap_err();
        assert!(matches!(err, ResearchError::PlanningFailed { .. }));
        assert_eq!(mock.prompts().len(), 2);
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_llm_error_on_retry_fails_planning() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::ApiRequest {
            message: "boom".into(),
        });
        mock.queue_error(LlmError::ApiRequest {
            message: "boom".into(),
        });
        let planner = planner(mock, 3);
        let mut board = FocusBoard::new();
        let err = planner.plan_round("topic", &[], &mut board, 1).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_replan_skips_known_areas_and_sends_evidence() {
        let mock = Arc::new(MockLlmProvider::with_response("1. A\n2. New angle"));
        let planner = planner(mock.clone(), 2);
        let mut board = FocusBoard::new();
        let first = board.add_round(vec!["A".into()], 1);
        board.exhaust(first[0]);
        let evidence = vec![EvidenceEntry::new("https://e", "finding text", first[0], "q")];

        let ids = planner.plan_round("topic", &evidence, &mut board, 2).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(board.get(ids[0]).unwrap().description, "New angle");
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("finding text"));
        assert!(prompt.contains("- A"));
    }

    #[tokio::test]
    async fn test_nothing_new_is_empty_not_error() {
        let mock = Arc::new(MockLlmProvider::with_response("1. A\n2. B"));
        let planner = planner(mock, 2);
        let mut board = FocusBoard::new();
        board.add_round(vec!["A".into(), "b".into()], 1);
        let ids = planner.plan_round("topic", &[], &mut board, 2).await.unwrap();
        assert!(ids.is_empty());
    }
}
