use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation history. Images are kept by reference
/// (snapshot id) only; pixels never outlive their cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl ConversationTurn {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into(), image_ref: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), image_ref: None }
    }

    pub fn user_with_image(text: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image_ref: Some(snapshot_id.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), image_ref: None }
    }

    /// Text sent for a past turn; a referenced screenshot is mentioned, not attached.
    pub fn render_text(&self) -> String {
        match &self.image_ref {
            Some(id) => format!("{}\n[screenshot {id} no longer attached]", self.text),
            None => self.text.clone(),
        }
    }
}

// ── OpenAI-compatible wire format ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub kind: StreamChunkKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunkKind {
    Reasoning,
    Content,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_turns_render_a_placeholder() {
        let turn = ConversationTurn::user_with_image("What next?", "abc");
        assert_eq!(turn.render_text(), "What next?\n[screenshot abc no longer attached]");
        assert_eq!(ConversationTurn::assistant("[]").render_text(), "[]");
    }

    #[test]
    fn parts_serialize_in_openai_shape() {
        let msg = ChatMessage {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "hi".into() },
                ContentPart::ImageUrl { image_url: ImageUrl { url: "data:image/png;base64,AAAA".into() } },
            ]),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image_url");
        assert_eq!(v["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
