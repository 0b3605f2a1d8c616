use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::ChatClient;
use crate::llm::{ LlmError, LlmType };
use crate::models::chat::{ ChatResponse, Message, Role };

enum Scripted {
    Reply(String),
    Fail(String),
}

/// Offline chat client. Replays scripted replies in order, then echoes the last human turn.
pub struct MockChatClient {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted::Reply(reply.into()));
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted::Fail(message.into()));
        }
    }

    /// Every message list the client was invoked with, oldest first.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Scripted::Reply(text)) => Ok(ChatResponse::from_text(self.model(), text)),
            Some(Scripted::Fail(message)) => Err(LlmError::Api { status: 500, message }),
            None => {
                let last_human = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Human)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                Ok(ChatResponse::from_text(self.model(), format!("echo: {}", last_human)))
            }
        }
    }

    fn model(&self) -> String {
        "mock".to_string()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Groq
    }
}
