use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::PilotResult;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Per-mode overrides keyed by mode name (e.g. `[backends."gpt-4o"]`).
    #[serde(default)]
    pub backends: HashMap<String, BackendEntry>,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Upper bound on conversation turns sent with each request.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Pause between consecutive actions of one cycle.
    #[serde(default = "default_inter_action_delay_ms")]
    pub inter_action_delay_ms: u64,
    /// Stop the run on the first failed action instead of recording it and moving on.
    #[serde(default)]
    pub abort_on_error: bool,
    #[serde(default = "default_true")]
    pub include_pointer: bool,
    #[serde(default = "default_capture_retries")]
    pub capture_retries: u32,
    /// Re-prompts allowed after an unparseable response before the run fails.
    #[serde(default = "default_parse_retries")]
    pub parse_retries: u32,
    #[serde(default)]
    pub journal: bool,
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_iterations: default_max_iterations(),
            max_history_turns: default_max_history_turns(),
            inter_action_delay_ms: default_inter_action_delay_ms(),
            abort_on_error: false,
            include_pointer: true,
            capture_retries: default_capture_retries(),
            parse_retries: default_parse_retries(),
            journal: false,
            journal_dir: None,
        }
    }
}

fn default_mode() -> String {
    "gpt-4o".into()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_max_history_turns() -> usize {
    20
}

fn default_inter_action_delay_ms() -> u64 {
    500
}

fn default_capture_retries() -> u32 {
    2
}

fn default_parse_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per decision, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    16_000
}

/// Optional overrides for a mode's built-in backend profile.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendEntry {
    pub api_base: Option<String>,
    pub model: Option<String>,
    /// Falls back to env var SCREENPILOT_<MODE>_API_KEY, then the vendor variable.
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Regions below this confidence (0.0–1.0) are discarded.
    #[serde(default)]
    pub min_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_ocr_language(),
            min_confidence: 0.0,
        }
    }
}

fn default_ocr_language() -> String {
    "eng".into()
}

fn default_true() -> bool {
    true
}

fn config_candidates() -> PilotResult<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            candidates.push(parent.join("config.toml"));
        }
    }
    candidates.push(std::env::current_dir()?.join("config.toml"));
    Ok(candidates)
}

/// Load `config.toml` from next to the executable, then the working directory.
/// Only a missing file falls back to defaults; unreadable or malformed files are errors.
pub fn load_config() -> PilotResult<AppConfig> {
    load_first_config(&config_candidates()?)
}

pub fn load_first_config(candidates: &[PathBuf]) -> PilotResult<AppConfig> {
    match candidates.iter().find(|p| p.exists()) {
        Some(path) => load_config_from(path),
        None => {
            tracing::warn!("config.toml not found next to executable or in working directory; using defaults");
            Ok(AppConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), mode = %config.operator.mode, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> PilotResult<AppConfig> {
    Ok(toml::from_str(content)?)
}
