use std::sync::Arc;
use std::time::Duration;

use crate::config::DecisionConfig;
use crate::errors::{PilotError, PilotResult};
use crate::llm::prompts;
use crate::llm::provider::{BackendError, Capabilities, DecisionBackend, DecisionRequest, EncodedImage};
use crate::llm::registry::Addressing;
use crate::llm::types::ConversationTurn;
use crate::perception::types::{ElementIndex, Snapshot};

/// Wraps one backend with the per-mode system prompt and the timeout/retry
/// policy. Shared read-only across cycles.
pub struct DecisionClient {
    backend: Arc<dyn DecisionBackend>,
    addressing: Addressing,
    system_prompt: String,
    config: DecisionConfig,
}

impl DecisionClient {
    pub fn new(backend: Arc<dyn DecisionBackend>, addressing: Addressing, config: DecisionConfig) -> Self {
        let system_prompt = prompts::system_prompt(addressing, backend.capabilities());
        Self {
            backend,
            addressing,
            system_prompt,
            config,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Label-addressed modes get the element list; others skip OCR entirely.
    pub fn wants_elements(&self) -> bool {
        self.addressing == Addressing::Labels && self.capabilities().accepts_element_list
    }

    /// Compose the user text for a fresh cycle.
    pub fn cycle_prompt(&self, objective: &str, elements: Option<&ElementIndex>, feedback: &[String]) -> String {
        let elements = elements.filter(|_| self.wants_elements());
        prompts::cycle_prompt(objective, elements, feedback)
    }

    /// One decision: `history` is the caller's copy of the conversation, the
    /// snapshot is attached to this request only. Returns the raw reply text.
    pub async fn decide(
        &self,
        history: Vec<ConversationTurn>,
        prompt: String,
        snapshot: &Snapshot,
    ) -> PilotResult<String> {
        let image = self
            .capabilities()
            .accepts_image
            .then(|| EncodedImage::png(snapshot.to_base64()));
        let request = DecisionRequest {
            turns: history,
            prompt,
            image,
        };
        self.send_with_retry(&request).await
    }

    async fn send_with_retry(&self, request: &DecisionRequest) -> PilotResult<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(timeout, self.backend.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };

            let err = match outcome {
                Ok(text) => {
                    tracing::debug!(backend = %self.backend.name(), attempt, len = text.len(), "decision received");
                    return Ok(text);
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                tracing::error!(
                    backend = %self.backend.name(),
                    attempt,
                    max_attempts,
                    error = %err,
                    "decision failed"
                );
                return Err(PilotError::Decision(format!(
                    "{} failed after {attempt} attempt(s): {err}",
                    self.backend.name()
                )));
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                backend = %self.backend.name(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient decision failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// `base * 2^(attempt-1)`, capped at `backoff_max_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.backoff_max_ms);
        Duration::from_millis(ms)
    }
}
