use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OperatorConfig;

/// Shared stop flag. Checked between cycles only, never mid-sequence.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run budgets: iterations, parse re-prompts, capture retries.
#[derive(Debug)]
pub struct LoopController {
    max_iterations: u32,
    parse_retries: u32,
    capture_retries: u32,
    parse_failures: u32,
    stop: StopHandle,
}

impl LoopController {
    pub fn new(config: &OperatorConfig, max_iterations: u32, stop: StopHandle) -> Self {
        Self {
            max_iterations,
            parse_retries: config.parse_retries,
            capture_retries: config.capture_retries,
            parse_failures: 0,
            stop,
        }
    }

    /// `true` once `iteration` (1-based) would exceed the budget.
    pub fn iterations_exhausted(&self, iteration: u32) -> bool {
        iteration > self.max_iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Record an unparseable reply. Returns `true` while a re-prompt is still allowed.
    pub fn record_parse_failure(&mut self) -> bool {
        self.parse_failures += 1;
        self.parse_failures <= self.parse_retries
    }

    /// A usable reply resets the re-prompt budget for the next cycle.
    pub fn reset_parse_failures(&mut self) {
        self.parse_failures = 0;
    }

    pub fn parse_failures(&self) -> u32 {
        self.parse_failures
    }

    /// Total capture attempts per cycle, the first one included.
    pub fn capture_attempts(&self) -> u32 {
        self.capture_retries + 1
    }
}
