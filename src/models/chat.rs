use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[serde(rename = "user", alias = "human")]
    Human,
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged turn of a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What a chat-completion call hands back.
///
/// `content` is `None` when the provider answered without a text field; `raw`
/// keeps the provider payload untouched so callers can still show something.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub raw: JsonValue,
}

impl ChatResponse {
    pub fn from_text(model: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            raw: serde_json::json!({ "content": content }),
            content: Some(content),
            model: model.into(),
            usage: None,
        }
    }

    /// The reply text, or the string form of the whole response when there is none.
    pub fn text(&self) -> String {
        match &self.content {
            Some(content) => content.clone(),
            None => self.to_string(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::assistant(self.text())
    }
}

impl fmt::Display for ChatResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Some(content) => write!(f, "content='{}' model='{}'", content, self.model)?,
            None => write!(f, "content=None model='{}' raw={}", self.model, self.raw)?,
        }
        if let Some(usage) = &self.usage {
            write!(
                f,
                " usage={{prompt: {}, completion: {}, total: {}}}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Message::new(stored.role, stored.content)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<StoredMessage>,
}

impl Conversation {
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().map(Message::from).collect()
    }
}
