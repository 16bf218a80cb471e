//! Focus areas and the board that orders them.
//!
//! Priorities form a total order over non-exhausted areas: a larger value is
//! more important, ties go to the earlier-created area. Every planning round
//! re-ranks the active areas as a dense descending sequence so the controller
//! always has exactly one next area.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a focus area. Areas are never deleted, only exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusStatus {
    Open,
    InProgress,
    Exhausted,
}

impl fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusStatus::Open => write!(f, "open"),
            FocusStatus::InProgress => write!(f, "in progress"),
            FocusStatus::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// A prioritized sub-topic of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusArea {
    pub id: usize,
    pub description: String,
    /// Larger is more important.
    pub priority: u32,
    pub status: FocusStatus,
    /// Planning round that produced the area (1-based).
    pub originating_cycle: u32,
    /// Search queries spent on this area so far.
    pub queries_issued: usize,
}

impl FocusArea {
    pub fn is_active(&self) -> bool {
        self.status != FocusStatus::Exhausted
    }
}

/// All focus areas of a session, in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FocusBoard {
    areas: Vec<FocusArea>,
    next_id: usize,
}

impl FocusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single open area with an explicit priority.
    pub fn insert(&mut self, description: impl Into<String>, priority: u32, cycle: u32) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.areas.push(FocusArea {
            id,
            description: description.into(),
            priority,
            status: FocusStatus::Open,
            originating_cycle: cycle,
            queries_issued: 0,
        });
        id
    }

    /// Append a planning round and re-rank every active area.
    ///
    /// Legacy active areas keep their relative order and rank ahead of the
    /// new round, which follows in planner order. Returns the new ids.
    pub fn add_round(&mut self, descriptions: Vec<String>, cycle: u32) -> Vec<usize> {
        let legacy: Vec<usize> = self.ranked().iter().map(|a| a.id).collect();
        let new_ids: Vec<usize> = descriptions
            .into_iter()
            .map(|d| self.insert(d, 0, cycle))
            .collect();

        let order: Vec<usize> = legacy.into_iter().chain(new_ids.iter().copied()).collect();
        let total = order.len() as u32;
        for (rank, id) in order.into_iter().enumerate() {
            if let Some(area) = self.get_mut(id) {
                area.priority = total - rank as u32;
            }
        }
        new_ids
    }

    /// Active areas, most important first.
    pub fn ranked(&self) -> Vec<&FocusArea> {
        let mut active: Vec<&FocusArea> = self.areas.iter().filter(|a| a.is_active()).collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        active
    }

    /// The highest-priority open or in-progress area.
    pub fn next_open(&self) -> Option<&FocusArea> {
        self.areas
            .iter()
            .filter(|a| a.is_active())
            .max_by(|a, b| a.priority.cmp(&b.priority).then(b.id.cmp(&a.id)))
    }

    pub fn get(&self, id: usize) -> Option<&FocusArea> {
        self.areas.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut FocusArea> {
        self.areas.iter_mut().find(|a| a.id == id)
    }

    /// Record `queries` spent on `id` and exhaust it once `budget` is reached.
    pub fn spend(&mut self, id: usize, queries: usize, budget: usize) -> Option<FocusStatus> {
        let area = self.get_mut(id)?;
        area.queries_issued += queries;
        area.status = if area.queries_issued >= budget.max(1) {
            FocusStatus::Exhausted
        } else {
            FocusStatus::InProgress
        };
        Some(area.status)
    }

    pub fn mark_in_progress(&mut self, id: usize) {
        if let Some(area) = self.get_mut(id)
            && area.status == FocusStatus::Open
        {
            area.status = FocusStatus::InProgress;
        }
    }

    pub fn exhaust(&mut self, id: usize) {
        if let Some(area) = self.get_mut(id) {
            area.status = FocusStatus::Exhausted;
        }
    }

    /// True when no area is left to work on (an empty board included).
    pub fn all_exhausted(&self) -> bool {
        self.areas.iter().all(|a| !a.is_active())
    }

    /// Whether an area with the same normalized description exists.
    pub fn contains_description(&self, description: &str) -> bool {
        let wanted = normalize(description);
        self.areas.iter().any(|a| normalize(&a.description) == wanted)
    }

    pub fn areas(&self) -> &[FocusArea] {
        &self.areas
    }

    pub fn active_count(&self) -> usize {
        self.areas.iter().filter(|a| a.is_active()).count()
    }

    pub fn exhausted_count(&self) -> usize {
        self.areas.len() - self.active_count()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

fn normalize(s: &str) -> String {
    crate::text::collapse_whitespace(s)
        .trim_end_matches(['.', '?', '!'])
        .to_lowercase()
}
