pub mod dispatcher;
pub mod input;

pub use dispatcher::{execute, execute_cycle, ActionResult, CycleReport, ExecutionOptions};
pub use input::{EnigoDriver, InputDriver};
