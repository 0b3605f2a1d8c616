use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ HistoryError, HistoryStore };
use crate::models::chat::{ Conversation, Message, StoredMessage };

/// Unbounded per-session history kept for the life of the process.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(&self, session_id: &str, message: &Message) -> Result<(), HistoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().push(StoredMessage {
            role: message.role,
            content: message.content.clone(),
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn get_conversation(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError> {
        let sessions = self.sessions.read().await;
        let all = sessions.get(session_id).map(|m| m.as_slice()).unwrap_or_default();
        let start = if limit == 0 { 0 } else { all.len().saturating_sub(limit) };
        Ok(Conversation {
            id: session_id.to_string(),
            messages: all[start..].to_vec(),
        })
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
