//! Evidence entries and the deduplicating content store.

use crate::text::{char_len, collapse_whitespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Deterministic fingerprint of extracted text.
///
/// SHA-256 hex over the whitespace-collapsed text, so re-scrapes of the same
/// page that differ only in layout whitespace share a fingerprint.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collapse_whitespace(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One piece of fetched evidence with its provenance. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub url: String,
    pub fingerprint: String,
    pub text: String,
    pub focus_area_id: usize,
    pub source_query: String,
    pub retrieved_at: DateTime<Utc>,
}

impl EvidenceEntry {
    pub fn new(
        url: impl Into<String>,
        text: impl Into<String>,
        focus_area_id: usize,
        source_query: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            url: url.into(),
            fingerprint: fingerprint(&text),
            text,
            focus_area_id,
            source_query: source_query.into(),
            retrieved_at: Utc::now(),
        }
    }
}

/// Append-only evidence ledger. Fingerprints are unique.
#[derive(Debug, Default, Clone)]
pub struct ContentStore {
    entries: Vec<EvidenceEntry>,
    fingerprints: HashSet<String>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Append `entry` unless its fingerprint is already stored.
    ///
    /// Returns `false` for a duplicate; the existing entry and its
    /// provenance are kept.
    pub fn add(&mut self, entry: EvidenceEntry) -> bool {
        if !self.fingerprints.insert(entry.fingerprint.clone()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Entries in insertion order.
    pub fn all(&self) -> &[EvidenceEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&EvidenceEntry> {
        self.entries.last()
    }

    /// Total extracted text in characters.
    pub fn size_estimate(&self) -> usize {
        self.entries.iter().map(|e| char_len(&e.text)).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
