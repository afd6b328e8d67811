use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Decision error: {0}")]
    Decision(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unresolved target: {0}")]
    UnresolvedTarget(String),

    #[error("Execution failure: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Iteration limit of {0} reached before the objective was done")]
    IterationLimit(u32),

    #[error("Run cancelled")]
    Cancelled,
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
