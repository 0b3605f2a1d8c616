use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::{ AsyncCommands, Client };

use super::{ HistoryError, HistoryStore };
use crate::models::chat::{ Conversation, Message, StoredMessage };

/// One Redis list per session, newest message at the head.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
    project_id: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str, project_id: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
            project_id: project_id.to_string(),
        })
    }

    fn key(&self, session_id: &str) -> String {
        session_key(&self.key_prefix, &self.project_id, session_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

fn session_key(prefix: &str, project_id: &str, session_id: &str) -> String {
    format!("{}{}:{}", prefix, project_id, session_id)
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(&self, session_id: &str, message: &Message) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let stored = StoredMessage {
            role: message.role,
            content: message.content.clone(),
            timestamp: Utc::now().timestamp(),
        };
        let json_msg = serde_json::to_string(&stored)?;
        let _: i64 = conn.lpush(self.key(session_id), json_msg).await?;
        Ok(())
    }

    async fn get_conversation(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Conversation, HistoryError> {
        let mut conn = self.get_connection().await?;
        let stop = if limit == 0 { -1 } else { (limit as isize) - 1 };
        let json_entries: Vec<String> = conn.lrange(self.key(session_id), 0, stop).await?;
        let mut messages = Vec::with_capacity(json_entries.len());

        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Error parsing history entry: {}", e),
            }
        }
        messages.reverse();

        Ok(Conversation {
            id: session_id.to_string(),
            messages,
        })
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.key(session_id)).await?;
        Ok(())
    }
}
