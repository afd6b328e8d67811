use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::PilotResult;
use crate::llm::types::{ConversationTurn, Role};

/// Ordered conversation owned by the engine. The system turn stays put; the
/// oldest other turns are evicted once `max_turns` is exceeded.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            turns: vec![ConversationTurn::system(system_prompt)],
            max_turns,
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        while self.non_system_len() > self.max_turns {
            match self.turns.iter().position(|t| t.role != Role::System) {
                Some(idx) => {
                    self.turns.remove(idx);
                }
                None => break,
            }
        }
    }

    /// Copy handed to the decision client; later pushes do not affect it.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn non_system_len(&self) -> usize {
        self.turns.iter().filter(|t| t.role != Role::System).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub iteration: u32,
    pub kind: String,
    pub payload: serde_json::Value,
}

/// Append-only JSONL record of one run.
pub struct SessionJournal {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionJournal {
    /// Opens `session_<uuid>.jsonl` under `dir`, or the platform data dir.
    pub fn create(dir: Option<&Path>) -> PilotResult<Self> {
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => data_dir_or_cwd(),
        };
        std::fs::create_dir_all(&dir)?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        tracing::info!(path = %file_path.display(), "session journal opened");
        Ok(Self { session_id, file_path })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn record(&self, iteration: u32, kind: &str, payload: serde_json::Value) -> PilotResult<()> {
        let entry = JournalEntry {
            ts: chrono::Utc::now(),
            session_id: self.session_id.clone(),
            iteration,
            kind: kind.to_string(),
            payload,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(path = %self.file_path.display(), kind, "journal entry written");
        Ok(())
    }
}

/// `<data dir>/screenpilot/sessions`, or the working directory.
fn data_dir_or_cwd() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("screenpilot").join("sessions"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_the_system_turn() {
        let mut history = ConversationHistory::new("rules", 2);
        history.push(ConversationTurn::user("one"));
        history.push(ConversationTurn::assistant("two"));
        history.push(ConversationTurn::user("three"));
        let texts: Vec<&str> = history.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["rules", "two", "three"]);
    }

    #[test]
    fn snapshots_are_detached() {
        let mut history = ConversationHistory::new("rules", 10);
        let copy = history.snapshot();
        history.push(ConversationTurn::user("later"));
        assert_eq!(copy.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn journal_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::create(Some(dir.path())).unwrap();
        journal.record(1, "response", serde_json::json!({"raw": "[]"})).unwrap();
        journal.record(1, "summary", serde_json::json!({"status": "done"})).unwrap();

        let content = std::fs::read_to_string(journal.path()).unwrap();
        let entries: Vec<JournalEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "response");
        assert_eq!(entries[1].payload["status"], "done");
        assert!(entries.iter().all(|e| e.session_id == journal.session_id));
    }
}
