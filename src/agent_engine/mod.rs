pub mod engine;
pub mod history;
pub mod loop_control;
pub mod state;

pub use engine::AgentEngine;
pub use loop_control::StopHandle;
pub use state::{LoopPhase, RunStatus, RunSummary};
