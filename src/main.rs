use std::process::ExitCode;

use screenpilot::agent_engine::StopHandle;
use screenpilot::config::{self, AppConfig};
use screenpilot::llm::OperatingMode;

const USAGE: &str = "usage: screenpilot <objective...>\n\
                     env: SCREENPILOT_MODE overrides the configured mode";

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    screenpilot::init_tracing();

    let objective = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if objective.trim().is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    }

    let config: AppConfig = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "cannot load config.toml");
            return ExitCode::from(2);
        }
    };

    let mode_name = std::env::var("SCREENPILOT_MODE").unwrap_or_else(|_| config.operator.mode.clone());
    let mode: OperatingMode = match mode_name.parse() {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!(error = %e, "cannot start");
            return ExitCode::from(2);
        }
    };

    let stop = StopHandle::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received; stopping after the current cycle");
            ctrl_c_stop.stop();
        }
    });

    let max_iterations = config.operator.max_iterations;
    match screenpilot::run_with_stop(&config, &objective, max_iterations, mode, stop).await {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "summary serialization failed"),
            }
            if summary.is_done() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot start");
            ExitCode::from(2)
        }
    }
}
