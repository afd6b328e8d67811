pub mod actions;
pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::sync::Arc;

use crate::agent_engine::{AgentEngine, RunSummary, StopHandle};
use crate::config::AppConfig;
use crate::errors::PilotResult;
use crate::executor::input::EnigoDriver;
use crate::llm::client::DecisionClient;
use crate::llm::registry::{build_backend, OperatingMode};
use crate::perception::locator::ElementLocator;
use crate::perception::ocr::default_recognizer;
use crate::perception::screenshot::XcapCapturer;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Run the operator loop for one objective against the real display.
///
/// Only startup problems (unknown mode, missing credentials) are returned as
/// `Err`; everything that happens once the loop is running ends up in the
/// returned `RunSummary`.
pub async fn run(
    config: &AppConfig,
    objective: &str,
    max_iterations: u32,
    mode: OperatingMode,
) -> PilotResult<RunSummary> {
    run_with_stop(config, objective, max_iterations, mode, StopHandle::new()).await
}

/// Like [`run`], honoring `stop` between cycles.
pub async fn run_with_stop(
    config: &AppConfig,
    objective: &str,
    max_iterations: u32,
    mode: OperatingMode,
    stop: StopHandle,
) -> PilotResult<RunSummary> {
    let backend = build_backend(mode, config)?;
    let client = DecisionClient::new(backend, mode.profile().addressing, config.decision.clone());

    let locator = client.wants_elements().then(|| {
        if !cfg!(feature = "ocr") {
            tracing::warn!(mode = %mode, "built without the `ocr` feature; label targets will not resolve");
        }
        ElementLocator::new(default_recognizer(&config.ocr.language), config.ocr.min_confidence)
    });

    let mut engine = AgentEngine::new(
        Arc::new(XcapCapturer::new()),
        locator,
        client,
        Box::new(EnigoDriver::new()),
        config.operator.clone(),
    )
    .with_stop_handle(stop);

    Ok(engine.run(objective, max_iterations).await)
}
