use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::provider::{BackendError, Capabilities, DecisionBackend, DecisionRequest};
use crate::llm::sse_parser;
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent, StreamChunkKind};

/// Backend settings resolved from the mode profile plus config overrides.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

pub struct OpenAiCompatibleProvider {
    id: String,
    settings: OpenAiSettings,
    capabilities: Capabilities,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, settings: OpenAiSettings, capabilities: Capabilities) -> Self {
        Self {
            id,
            settings,
            capabilities,
            client: reqwest::Client::new(),
        }
    }

    /// Build the chat message list: history turns, then the new user turn
    /// carrying the prompt and (if accepted) the screenshot.
    pub fn build_messages(&self, request: &DecisionRequest) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = request
            .turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: MessageContent::Text(turn.render_text()),
            })
            .collect();

        let content = match &request.image {
            Some(image) if self.capabilities.accepts_image => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.prompt.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_uri(),
                    },
                },
            ]),
            _ => MessageContent::Text(request.prompt.clone()),
        };
        messages.push(ChatMessage {
            role: "user".into(),
            content,
        });
        messages
    }
}

#[async_trait]
impl DecisionBackend for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn complete(&self, request: &DecisionRequest) -> Result<String, BackendError> {
        let messages = self.build_messages(request);
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": &messages,
            "stream": self.settings.stream,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        tracing::debug!(
            provider = %self.id,
            model = %self.settings.model,
            stream = self.settings.stream,
            messages = messages.len(),
            "sending decision request"
        );
        tracing::debug!(body = %sanitize_for_log(&body), "request body (sanitized, base64 omitted)");

        let mut builder = self.client.post(&self.settings.api_base).json(&body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &err_body));
        }

        if self.settings.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE stream into the full reply text.
    async fn handle_stream(&self, response: reqwest::Response) -> Result<String, BackendError> {
        let mut byte_stream = response.bytes_stream();
        let mut reply = StreamedReply::default();

        while let Some(result) = byte_stream.next().await {
            if reply.feed(&result?)? {
                break;
            }
        }
        reply.finish()?;

        tracing::info!(
            provider = %self.id,
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning_len,
            "decision stream complete"
        );
        Ok(reply.content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> Result<String, BackendError> {
        let json: serde_json::Value = response.json().await?;
        let content = extract_message_content(&json)?;
        tracing::info!(provider = %self.id, content_len = content.len(), "decision response received");
        Ok(content)
    }
}

/// Reassembles SSE lines from raw network chunks. Bytes are buffered until a
/// full line arrives, so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
struct StreamedReply {
    pending: Vec<u8>,
    content: String,
    reasoning_len: usize,
    done: bool,
}

impl StreamedReply {
    /// Returns true once the stream has signalled completion.
    fn feed(&mut self, bytes: &[u8]) -> Result<bool, BackendError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.line(&line)?;
            if self.done {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flush a trailing line that arrived without a newline.
    fn finish(&mut self) -> Result<(), BackendError> {
        if self.done || self.pending.is_empty() {
            return Ok(());
        }
        let line = std::mem::take(&mut self.pending);
        self.line(&line)
    }

    fn line(&mut self, raw: &[u8]) -> Result<(), BackendError> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| BackendError::Malformed(format!("SSE line is not UTF-8: {e}")))?;
        if let Some(chunk) = sse_parser::parse_sse_line(line.trim())? {
            match chunk.kind {
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::Reasoning => self.reasoning_len += chunk.content.len(),
                StreamChunkKind::Done => self.done = true,
            }
        }
        Ok(())
    }
}

/// Pull `choices[0].message.content` out of a chat completion. Content may be
/// a string or an array of text parts.
pub fn extract_message_content(json: &serde_json::Value) -> Result<String, BackendError> {
    let content = &json["choices"][0]["message"]["content"];
    if let Some(text) = content.as_str() {
        return Ok(text.to_string());
    }
    if let Some(parts) = content.as_array() {
        return Ok(parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""));
    }
    Err(BackendError::Malformed(format!(
        "no message content in completion: {}",
        truncate_for_log(&json.to_string(), 300)
    )))
}

/// Clone `body` for logging with base64 image payloads replaced.
pub fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
                if let Some(data) = part.get_mut("source").and_then(|s| s.get_mut("data")) {
                    *data = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::EncodedImage;
    use crate::llm::types::ConversationTurn;

    fn provider(accepts_image: bool) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            "test".into(),
            OpenAiSettings {
                api_base: "http://localhost:1/v1/chat/completions".into(),
                api_key: None,
                model: "m".into(),
                temperature: 0.0,
                max_tokens: 100,
                stream: false,
            },
            Capabilities {
                accepts_image,
                accepts_element_list: false,
                returns_structured_json: true,
            },
        )
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            turns: vec![
                ConversationTurn::system("rules"),
                ConversationTurn::user_with_image("first", "s1"),
                ConversationTurn::assistant("[]"),
            ],
            prompt: "next?".into(),
            image: Some(EncodedImage::png("AAAA".into())),
        }
    }

    #[test]
    fn messages_attach_only_the_current_image() {
        let msgs = provider(true).build_messages(&request());
        assert_eq!(msgs.len(), 4);
        let v = serde_json::to_value(&msgs).unwrap();
        assert_eq!(v[0]["role"], "system");
        assert!(v[1]["content"].as_str().unwrap().contains("[screenshot s1"));
        assert_eq!(v[3]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn text_only_backends_get_no_image_part() {
        let msgs = provider(false).build_messages(&request());
        let v = serde_json::to_value(&msgs).unwrap();
        assert_eq!(v[3]["content"], "next?");
    }

    #[test]
    fn content_extraction() {
        let ok = serde_json::json!({"choices":[{"message":{"content":"[{\"type\":\"done\"}]"}}]});
        assert_eq!(extract_message_content(&ok).unwrap(), "[{\"type\":\"done\"}]");
        let parts = serde_json::json!({"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]});
        assert_eq!(extract_message_content(&parts).unwrap(), "ab");
        assert!(extract_message_content(&serde_json::json!({"choices":[]})).is_err());
    }

    #[test]
    fn stream_chunks_split_inside_a_character_decode_cleanly() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"type\\\":\\\"write\\\",\\\"text\\\":\\\"café\\\"}]\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;
        assert!(!line.is_char_boundary(split));

        let mut reply = StreamedReply::default();
        assert!(!reply.feed(&bytes[..split]).unwrap());
        assert!(!reply.feed(&bytes[split..]).unwrap());
        assert!(reply.feed(b"data: [DONE]\n").unwrap());

        let actions = crate::actions::normalize(&reply.content).unwrap();
        assert_eq!(
            actions,
            vec![crate::actions::Action::Write { text: "café".into() }]
        );
    }

    #[test]
    fn stream_without_trailing_newline_is_flushed() {
        let mut reply = StreamedReply::default();
        reply.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}").unwrap();
        assert!(reply.content.is_empty());
        reply.finish().unwrap();
        assert_eq!(reply.content, "ok");
    }

    #[test]
    fn invalid_utf8_line_is_malformed() {
        let mut reply = StreamedReply::default();
        let err = reply.feed(b"data: \xff\xfe\n").unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[test]
    fn log_sanitizing_strips_images() {
        let body = serde_json::json!({
            "messages": [{"role":"user","content":[{"type":"image_url","image_url":{"url":"data:image/png;base64,SECRET"}}]}]
        });
        let logged = sanitize_for_log(&body);
        assert!(!logged.contains("SECRET"));
        assert!(logged.contains("<omitted_base64_image>"));
    }
}
