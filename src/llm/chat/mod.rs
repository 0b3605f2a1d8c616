pub mod groq;
pub mod mock;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use log::warn;
use serde_json::Value as JsonValue;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::{ ChatResponse, Message };
use self::groq::GroqChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_BACKOFF_SHIFT: u32 = 6;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError>;

    /// A bare prompt is sent as a single human turn.
    async fn invoke_prompt(&self, prompt: &str) -> Result<ChatResponse, LlmError> {
        self.invoke(&[Message::human(prompt)]).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let response = self.invoke(messages).await?;
        Ok(full_response_as_stream(response.text()))
    }

    fn model(&self) -> String;
    fn llm_type(&self) -> LlmType;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TokenStream
where
    F: FnOnce(mpsc::Sender<Result<String, LlmError>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn full_response_as_stream(text: String) -> TokenStream {
    create_streaming_response(move |tx| async move {
        let _ = tx.send(Ok(text)).await;
    })
}

/// 500 ms doubled per attempt, capped at 32 s.
fn backoff_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * (1u32 << attempt.min(MAX_BACKOFF_SHIFT))
}

/// Removes the next complete line from `buffer` and decodes it.
///
/// Bytes after the last `\n` stay in the buffer, so a character split across
/// network chunks is only decoded once all of it has arrived.
pub(crate) fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Runs `op`, re-running it up to `max_retries` more times while the error is transient.
pub async fn with_retries<T, F, Fut>(
    max_retries: u32,
    label: &str,
    mut op: F
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                attempt += 1;
                warn!(
                    "{} request failed ({}), retry {}/{} in {:?}",
                    label,
                    e,
                    attempt,
                    max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
}

/// Turns a non-2xx response into `LlmError::Api`, pulling the provider's message out of the body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<JsonValue>(&body) {
        Ok(json) =>
            match &json["error"] {
                JsonValue::String(s) => s.clone(),
                JsonValue::Object(obj) =>
                    obj
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| body.clone()),
                _ => body.clone(),
            }
        Err(_) => body.clone(),
    };
    Err(LlmError::Api { status: status.as_u16(), message })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Groq => Arc::new(GroqChatClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
    };
    Ok(client)
}
