//! Context-budgeted evidence digest.
//!
//! Used for planner re-invocation, the pause assessment, the final summary
//! and Q&A grounding. When the evidence does not fit, entries are dropped
//! oldest-lowest-priority first until every remaining entry gets at least
//! `min_entry_chars`, then each entry is cut to an equal share.

use super::evidence::EvidenceEntry;
use super::focus::FocusBoard;
use crate::text::{char_len, truncate_chars};
use std::collections::BTreeMap;

/// Characters held back from the context budget for the prompt itself.
pub const PROMPT_RESERVE_CHARS: usize = 1_500;

/// Rendered evidence plus bookkeeping about what made it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    pub text: String,
    pub entries_included: usize,
    pub entries_dropped: usize,
    /// Source URLs in citation order (`[1]` is `sources[0]`).
    pub sources: Vec<String>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.entries_included == 0
    }
}

/// Context budget left for evidence once the prompt reserve is taken out.
pub fn evidence_budget(context_budget: usize) -> usize {
    context_budget.saturating_sub(PROMPT_RESERVE_CHARS).max(context_budget / 2)
}

/// Build a digest of `entries` no longer than `budget` characters.
pub fn build_digest(
    entries: &[EvidenceEntry],
    board: &FocusBoard,
    budget: usize,
    min_entry_chars: usize,
) -> Digest {
    if entries.is_empty() || budget == 0 {
        return Digest {
            entries_dropped: entries.len(),
            ..Digest::default()
        };
    }

    let priority_of = |e: &EvidenceEntry| board.get(e.focus_area_id).map_or(0, |a| a.priority);

    // Drop order: lowest area priority first, oldest first within a priority.
    let mut drop_order: Vec<usize> = (0..entries.len()).collect();
    drop_order.sort_by_key(|&i| (priority_of(&entries[i]), i));

    let mut kept = vec![true; entries.len()];
    let mut dropped = 0;
    for &victim in &drop_order {
        let layout = Layout::new(entries, board, &kept);
        let fits = layout.overhead + layout.body_chars <= budget;
        if fits || layout.count <= 1 || layout.share(budget) >= min_entry_chars {
            break;
        }
        kept[victim] = false;
        dropped += 1;
    }

    let layout = Layout::new(entries, board, &kept);
    let share = if layout.overhead + layout.body_chars <= budget {
        usize::MAX
    } else {
        layout.share(budget)
    };

    let mut text = String::new();
    let mut sources = Vec::new();
    for (area_id, indices) in &layout.groups {
        text.push_str(&section_header(board, *area_id));
        for &i in indices {
            let entry = &entries[i];
            sources.push(entry.url.clone());
            text.push_str(&entry_header(sources.len(), entry));
            text.push_str(truncate_chars(entry.text.trim(), share));
            text.push_str("\n\n");
        }
    }

    Digest {
        text: truncate_chars(text.trim_end(), budget).to_string(),
        entries_included: layout.count,
        entries_dropped: dropped,
        sources,
    }
}

/// Grouping and size of the currently kept entries.
struct Layout {
    groups: BTreeMap<usize, Vec<usize>>,
    count: usize,
    overhead: usize,
    body_chars: usize,
}

impl Layout {
    fn new(entries: &[EvidenceEntry], board: &FocusBoard, kept: &[bool]) -> Self {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if kept[i] {
                groups.entry(entry.focus_area_id).or_default().push(i);
            }
        }

        let mut overhead = 0;
        let mut body_chars = 0;
        let mut n = 0;
        for (area_id, indices) in &groups {
            overhead += char_len(&section_header(board, *area_id));
            for &i in indices {
                n += 1;
                overhead += char_len(&entry_header(n, &entries[i])) + 2;
                body_chars += char_len(entries[i].text.trim());
            }
        }

        Self {
            groups,
            count: n,
            overhead,
            body_chars,
        }
    }

    fn share(&self, budget: usize) -> usize {
        budget.saturating_sub(self.overhead) / self.count.max(1)
    }
}

fn section_header(board: &FocusBoard, area_id: usize) -> String {
    match board.get(area_id) {
        Some(area) => format!("## Focus area: {}\n\n", area.description),
        None => format!("## Focus area #{area_id}\n\n"),
    }
}

fn entry_header(n: usize, entry: &EvidenceEntry) -> String {
    format!("[{n}] {} (query: {})\n", entry.url, entry.source_query)
}
