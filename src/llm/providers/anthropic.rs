use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::provider::{BackendError, Capabilities, DecisionBackend, DecisionRequest};
use crate::llm::providers::openai_compatible::sanitize_for_log;
use crate::llm::types::Role;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Anthropic Messages API backend.
pub struct AnthropicProvider {
    id: String,
    settings: AnthropicSettings,
    capabilities: Capabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, settings: AnthropicSettings, capabilities: Capabilities) -> Self {
        Self {
            id,
            settings,
            capabilities,
            client: reqwest::Client::new(),
        }
    }

    /// System turns are lifted into the top-level `system` field. The rest must
    /// alternate user/assistant and start with user, so leading assistant turns
    /// are dropped and consecutive same-role turns merged.
    pub fn build_body(&self, request: &DecisionRequest) -> Value {
        let system = request
            .turns
            .iter()
            .filter(|t| t.role == Role::System)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages: Vec<(Role, Vec<Value>)> = Vec::new();
        let mut push = |role: Role, block: Value| {
            if let Some((last, blocks)) = messages.last_mut() {
                if *last == role {
                    blocks.push(block);
                    return;
                }
            } else if role == Role::Assistant {
                return;
            }
            messages.push((role, vec![block]));
        };

        for turn in request.turns.iter().filter(|t| t.role != Role::System) {
            push(turn.role, json!({ "type": "text", "text": turn.render_text() }));
        }
        push(Role::User, json!({ "type": "text", "text": request.prompt }));
        if let Some(image) = request.image.as_ref().filter(|_| self.capabilities.accepts_image) {
            push(
                Role::User,
                json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": image.media_type,
                        "data": image.base64,
                    }
                }),
            );
        }

        let messages: Vec<Value> = messages
            .into_iter()
            .map(|(role, content)| json!({ "role": role.as_str(), "content": content }))
            .collect();

        let mut body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        body
    }
}

#[async_trait]
impl DecisionBackend for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn complete(&self, request: &DecisionRequest) -> Result<String, BackendError> {
        let body = self.build_body(request);
        tracing::debug!(provider = %self.id, model = %self.settings.model, "sending decision request");
        tracing::debug!(body = %sanitize_for_log(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.settings.api_base)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &err_body));
        }

        let json: Value = response.json().await?;
        let text = extract_text_blocks(&json)?;
        tracing::info!(
            provider = %self.id,
            content_len = text.len(),
            stop_reason = %json["stop_reason"].as_str().unwrap_or(""),
            "decision response received"
        );
        Ok(text)
    }
}

/// Concatenate the `text` blocks of a Messages API reply.
pub fn extract_text_blocks(json: &Value) -> Result<String, BackendError> {
    let blocks = json["content"]
        .as_array()
        .ok_or_else(|| BackendError::Malformed("reply has no content array".into()))?;
    Ok(blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::EncodedImage;
    use crate::llm::types::ConversationTurn;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            "claude-3".into(),
            AnthropicSettings {
                api_base: "http://localhost:1/v1/messages".into(),
                api_key: "k".into(),
                model: "claude".into(),
                temperature: 0.0,
                max_tokens: 1024,
            },
            Capabilities {
                accepts_image: true,
                accepts_element_list: false,
                returns_structured_json: true,
            },
        )
    }

    #[test]
    fn body_lifts_system_and_alternates_roles() {
        let request = DecisionRequest {
            turns: vec![
                ConversationTurn::system("rules"),
                ConversationTurn::assistant("orphan reply"),
                ConversationTurn::user("old prompt"),
                ConversationTurn::assistant("[]"),
                ConversationTurn::user("parse failed, retry"),
            ],
            prompt: "now?".into(),
            image: Some(EncodedImage::png("IMG".into())),
        };
        let body = provider().build_body(&request);
        assert_eq!(body["system"], "rules");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[2]["role"], "user");
        let last = msgs[2]["content"].as_array().unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[1]["text"], "now?");
        assert_eq!(last[2]["source"]["data"], "IMG");
    }

    #[test]
    fn text_blocks_are_joined() {
        let reply = json!({"content":[{"type":"text","text":"[{\"type\":"},{"type":"text","text":"\"done\"}]"}]});
        assert_eq!(extract_text_blocks(&reply).unwrap(), "[{\"type\":\"done\"}]");
        assert!(extract_text_blocks(&json!({"error":"x"})).is_err());
    }
}
