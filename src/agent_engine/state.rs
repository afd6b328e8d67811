use serde::{Deserialize, Serialize};

/// Phases of one run of the operator loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Init,
    Capturing,
    Deciding,
    Validating,
    Executing,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Done,
    Error,
}

/// Mutated once per cycle by the engine; terminal when status is not running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopState {
    pub iteration: u32,
    pub status: RunStatus,
    pub last_error: Option<String>,
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            status: RunStatus::Running,
            last_error: None,
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller gets back when a run ends, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub iterations: u32,
    /// `Done` on success, otherwise the phase that failed.
    pub last_phase: LoopPhase,
    pub last_error: Option<String>,
    /// Raw text of the last backend reply, kept for diagnosis.
    pub last_response: Option<String>,
    /// Summary carried by the `done` action, if any.
    pub summary: Option<String>,
}

impl RunSummary {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}
