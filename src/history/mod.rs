mod memory;
mod redis;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::models::chat::{ Conversation, Message };

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Unsupported history store type: {0}")]
    Unsupported(String),
}

/// Session-scoped chat history. A session's messages come back in turn order.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, session_id: &str, message: &Message) -> Result<(), HistoryError>;

    /// The most recent `limit` messages; `limit == 0` means all of them.
    async fn get_conversation(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError>;

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError>;
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub store_type: String,
    pub host: String,
    pub key_prefix: String,
    pub project_id: String,
}

pub fn create_history_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match config.store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        "redis" => {
            let store = RedisHistoryStore::new(
                &config.host,
                &config.key_prefix,
                &config.project_id
            )?;
            Ok(Arc::new(store))
        }
        other => Err(HistoryError::Unsupported(other.to_string())),
    }
}

pub fn initialize_history_store(
    config: &HistoryConfig
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    if config.store_type.eq_ignore_ascii_case("memory") {
        info!("Chat history will be kept in process memory");
    } else {
        info!(
            "Chat history will be stored in: {} at {} (project '{}')",
            config.store_type,
            config.host,
            config.project_id
        );
    }
    create_history_store(config)
}

pub fn format_history_for_prompt(conversation: &Conversation) -> String {
    if conversation.messages.is_empty() {
        return String::new();
    }
    let mut result = String::from("Previous conversation:\n");
    for msg in &conversation.messages {
        let role_display = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };

        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ Role, StoredMessage };

    #[test]
    fn unknown_store_type_is_rejected() {
        let config = HistoryConfig {
            store_type: "firestore".into(),
            host: String::new(),
            key_prefix: String::new(),
            project_id: String::new(),
        };
        assert!(matches!(create_history_store(&config), Err(HistoryError::Unsupported(_))));
    }

    #[test]
    fn formats_roles_for_display() {
        let conversation = Conversation {
            id: "s".into(),
            messages: vec![
                StoredMessage { role: Role::Human, content: "hi".into(), timestamp: 0 },
                StoredMessage { role: Role::Assistant, content: "hello".into(), timestamp: 1 }
            ],
        };
        assert_eq!(
            format_history_for_prompt(&conversation),
            "Previous conversation:\nUser: hi\nAssistant: hello\n"
        );
        assert_eq!(format_history_for_prompt(&Conversation::default()), "");
    }
}
