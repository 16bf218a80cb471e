//! Append-only, human-readable research log.
//!
//! One file per session. Entries appear in content-store insertion order and
//! the final summary is appended last.

use super::evidence::EvidenceEntry;
use super::session::ResearchSession;
use super::summarizer::Summary;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const RULE: &str = "========================================================================";
const THIN_RULE: &str = "------------------------------------------------------------------------";

pub struct ResearchLog {
    path: PathBuf,
    file: File,
    entries_written: usize,
}

impl ResearchLog {
    pub fn file_name(session: &ResearchSession) -> String {
        format!("research-{}.log", session.id)
    }

    /// Create the log in `dir` and write the session header.
    pub fn create(dir: &Path, session: &ResearchSession) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(session));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut log = Self {
            path,
            file,
            entries_written: 0,
        };
        log.write(&format!(
            "Research session {}\nQuery: {}\nStarted: {}\n{RULE}\n\n",
            session.id,
            session.query,
            session.created_at.to_rfc3339()
        ))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    /// Append one evidence block.
    pub fn append_entry(&mut self, entry: &EvidenceEntry, focus_area: &str) -> io::Result<()> {
        let n = self.entries_written + 1;
        self.write(&format!(
            "[Entry {n}]\nFocus area: {focus_area}\nQuery: {}\nURL: {}\nRetrieved: {}\n\n{}\n\n{THIN_RULE}\n\n",
            entry.source_query,
            entry.url,
            entry.retrieved_at.to_rfc3339(),
            entry.text.trim()
        ))?;
        self.entries_written = n;
        Ok(())
    }

    pub fn append_summary(&mut self, summary: &Summary) -> io::Result<()> {
        let mut block = format!(
            "{RULE}\nSUMMARY ({} evidence entries, generated {})\n{RULE}\n\n{}\n",
            summary.evidence_count,
            summary.generated_at.to_rfc3339(),
            summary.text.trim()
        );
        if !summary.sources.is_empty() {
            block.push_str("\nSources:\n");
            for (i, url) in summary.sources.iter().enumerate() {
                block.push_str(&format!("[{}] {url}\n", i + 1));
            }
        }
        self.write(&block)
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_entries_then_summary_in_order() {
        let dir = TempDir::new().unwrap();
        let session = ResearchSession::new("How do heat pumps perform in cold climates?");
        let mut log = ResearchLog::create(dir.path(), &session).unwrap();

        log.append_entry(&EvidenceEntry::new("https://a", "first page", 0, "q one"), "efficiency")
            .unwrap();
        log.append_entry(&EvidenceEntry::new("https://b", "second page", 1, "q two"), "cost")
            .unwrap();
        log.append_summary(&Summary {
            text: "They work [1].".into(),
            sources: vec!["https://a".into()],
            evidence_count: 2,
            generated_at: Utc::now(),
        })
        .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.starts_with(&format!("Research session {}", session.id)));
        let first = content.find("[Entry 1]").unwrap();
        let second = content.find("[Entry 2]").unwrap();
        let summary = content.find("SUMMARY").unwrap();
        assert!(first < second && second < summary);
        assert!(content.contains("Focus area: cost\nQuery: q two\nURL: https://b"));
        assert!(content.contains("[1] https://a"));
        assert_eq!(log.entries_written(), 2);
    }

    #[test]
    fn test_file_named_after_session() {
        let dir = TempDir::new().unwrap();
        let session = ResearchSession::new("q");
        let log = ResearchLog::create(dir.path(), &session).unwrap();
        assert_eq!(
            log.path().file_name().unwrap().to_string_lossy(),
            format!("research-{}.log", session.id)
        );
    }
}
