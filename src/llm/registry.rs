use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{AppConfig, BackendEntry};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::{Capabilities, DecisionBackend};
use crate::llm::providers::anthropic::{AnthropicProvider, AnthropicSettings};
use crate::llm::providers::openai_compatible::{OpenAiCompatibleProvider, OpenAiSettings};

const DEFAULT_TEMPERATURE: f64 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Decision mode selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Gpt4o,
    Gpt4WithOcr,
    Claude3,
    Gemini,
    QwenVl,
    Llava,
}

/// How a mode tells the executor where to click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Coordinates,
    Labels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    OpenAiCompatible,
    Anthropic,
}

/// Built-in defaults for a mode; `[backends.<mode>]` entries override them.
#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    pub adapter: Adapter,
    pub addressing: Addressing,
    pub capabilities: Capabilities,
    pub api_base: &'static str,
    pub model: &'static str,
    /// Vendor-wide key variable. `None` for keyless local backends.
    pub vendor_key_var: Option<&'static str>,
}

const OPENAI_BASE: &str = "https://api.openai.com/v1/chat/completions";

const VISION: Capabilities = Capabilities {
    accepts_image: true,
    accepts_element_list: false,
    returns_structured_json: true,
};

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        OperatingMode::Gpt4o,
        OperatingMode::Gpt4WithOcr,
        OperatingMode::Claude3,
        OperatingMode::Gemini,
        OperatingMode::QwenVl,
        OperatingMode::Llava,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Gpt4o => "gpt-4o",
            OperatingMode::Gpt4WithOcr => "gpt-4-with-ocr",
            OperatingMode::Claude3 => "claude-3",
            OperatingMode::Gemini => "gemini",
            OperatingMode::QwenVl => "qwen-vl",
            OperatingMode::Llava => "llava",
        }
    }

    pub fn profile(&self) -> ModeProfile {
        match self {
            OperatingMode::Gpt4o => ModeProfile {
                adapter: Adapter::OpenAiCompatible,
                addressing: Addressing::Coordinates,
                capabilities: VISION,
                api_base: OPENAI_BASE,
                model: "gpt-4o",
                vendor_key_var: Some("OPENAI_API_KEY"),
            },
            OperatingMode::Gpt4WithOcr => ModeProfile {
                adapter: Adapter::OpenAiCompatible,
                addressing: Addressing::Labels,
                capabilities: Capabilities {
                    accepts_element_list: true,
                    ..VISION
                },
                api_base: OPENAI_BASE,
                model: "gpt-4o",
                vendor_key_var: Some("OPENAI_API_KEY"),
            },
            OperatingMode::Claude3 => ModeProfile {
                adapter: Adapter::Anthropic,
                addressing: Addressing::Coordinates,
                capabilities: VISION,
                api_base: "https://api.anthropic.com/v1/messages",
                model: "claude-3-5-sonnet-latest",
                vendor_key_var: Some("ANTHROPIC_API_KEY"),
            },
            OperatingMode::Gemini => ModeProfile {
                adapter: Adapter::OpenAiCompatible,
                addressing: Addressing::Coordinates,
                capabilities: VISION,
                api_base: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-1.5-pro",
                vendor_key_var: Some("GEMINI_API_KEY"),
            },
            OperatingMode::QwenVl => ModeProfile {
                adapter: Adapter::OpenAiCompatible,
                addressing: Addressing::Coordinates,
                capabilities: VISION,
                api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions",
                model: "qwen-vl-max",
                vendor_key_var: Some("DASHSCOPE_API_KEY"),
            },
            OperatingMode::Llava => ModeProfile {
                adapter: Adapter::OpenAiCompatible,
                addressing: Addressing::Coordinates,
                capabilities: Capabilities {
                    returns_structured_json: false,
                    ..VISION
                },
                api_base: "http://localhost:11434/v1/chat/completions",
                model: "llava",
                vendor_key_var: None,
            },
        }
    }

    pub fn uses_labels(&self) -> bool {
        self.profile().addressing == Addressing::Labels
    }

    /// Mode-specific key variable, e.g. `SCREENPILOT_GPT_4O_API_KEY`.
    pub fn key_env_var(&self) -> String {
        format!(
            "SCREENPILOT_{}_API_KEY",
            self.as_str().to_uppercase().replace('-', "_")
        )
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        OperatingMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = OperatingMode::ALL.iter().map(|m| m.as_str()).collect();
                PilotError::UnsupportedMode(format!(
                    "'{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// Key lookup order: mode variable, vendor variable, config value.
/// Empty strings count as unset.
pub fn resolve_api_key<F>(mode: OperatingMode, entry: Option<&BackendEntry>, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| v.filter(|k| !k.trim().is_empty());

    non_empty(env(&mode.key_env_var()))
        .or_else(|| non_empty(mode.profile().vendor_key_var.and_then(&env)))
        .or_else(|| non_empty(entry.and_then(|e| e.api_key.clone())))
}

/// Construct the backend for `mode`. Fails with `UnsupportedMode` when a
/// keyed mode has no resolvable credential, so the run never starts.
pub fn build_backend(mode: OperatingMode, config: &AppConfig) -> PilotResult<Arc<dyn DecisionBackend>> {
    build_backend_with(mode, config, |name| std::env::var(name).ok())
}

pub fn build_backend_with<F>(
    mode: OperatingMode,
    config: &AppConfig,
    env: F,
) -> PilotResult<Arc<dyn DecisionBackend>>
where
    F: Fn(&str) -> Option<String>,
{
    let profile = mode.profile();
    let entry = config.backends.get(mode.as_str());
    let api_key = resolve_api_key(mode, entry, env);

    if profile.vendor_key_var.is_some() && api_key.is_none() {
        return Err(PilotError::UnsupportedMode(format!(
            "mode '{mode}' needs an API key: set {} or {}, or backends.\"{mode}\".api_key",
            mode.key_env_var(),
            profile.vendor_key_var.unwrap_or_default(),
        )));
    }

    let api_base = entry
        .and_then(|e| e.api_base.clone())
        .unwrap_or_else(|| profile.api_base.to_string());
    let model = entry
        .and_then(|e| e.model.clone())
        .unwrap_or_else(|| profile.model.to_string());
    let temperature = entry.and_then(|e| e.temperature).unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = entry.and_then(|e| e.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS);

    tracing::info!(
        mode = %mode,
        adapter = ?profile.adapter,
        model = %model,
        api_base = %api_base,
        "decision backend configured"
    );

    let backend: Arc<dyn DecisionBackend> = match profile.adapter {
        Adapter::OpenAiCompatible => Arc::new(OpenAiCompatibleProvider::new(
            mode.as_str().to_string(),
            OpenAiSettings {
                api_base,
                api_key,
                model,
                temperature,
                max_tokens,
                stream: entry.and_then(|e| e.stream).unwrap_or(false),
            },
            profile.capabilities,
        )),
        Adapter::Anthropic => Arc::new(AnthropicProvider::new(
            mode.as_str().to_string(),
            AnthropicSettings {
                api_base,
                api_key: api_key.unwrap_or_default(),
                model,
                temperature,
                max_tokens,
            },
            profile.capabilities,
        )),
    };
    Ok(backend)
}
