use crate::llm::provider::BackendError;
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> Result<Option<StreamChunk>, BackendError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let data = if let Some(d) = line.strip_prefix("data:") {
        d.trim()
    } else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| BackendError::Malformed(format!("SSE data: {e}")))?;

    if let Some(err) = json.get("error") {
        return Err(BackendError::Rejected(err.to_string()));
    }

    if let Some(first) = json["choices"].as_array().and_then(|c| c.first()) {
        let delta = &first["delta"];

        // Reasoning content (some models like DeepSeek expose this)
        if let Some(reasoning) = delta["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                return Ok(Some(StreamChunk {
                    kind: StreamChunkKind::Reasoning,
                    content: reasoning.to_string(),
                }));
            }
        }

        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                return Ok(Some(StreamChunk {
                    kind: StreamChunkKind::Content,
                    content: content.to_string(),
                }));
            }
        }

        if first["finish_reason"].as_str().is_some() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Done,
                content: String::new(),
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"[{\"type\""}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "[{\"type\"");
    }

    #[test]
    fn done_marker_and_finish_reason() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap().unwrap().kind, StreamChunkKind::Done);
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Done);
    }

    #[test]
    fn keep_alives_and_other_fields_are_ignored() {
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(": ping").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
    }

    #[test]
    fn error_payload_is_surfaced() {
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Err(BackendError::Rejected(_))
        ));
        assert!(matches!(parse_sse_line("data: {oops"), Err(BackendError::Malformed(_))));
    }
}
