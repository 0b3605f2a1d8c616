use async_trait::async_trait;

use super::openai::OpenAIChatClient;
use super::{ ChatClient, TokenStream };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::{ ChatResponse, Message };

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "mixtral-8x7b-32768";

/// Groq speaks the OpenAI wire format; this only swaps the defaults.
pub struct GroqChatClient {
    inner: OpenAIChatClient,
}

impl GroqChatClient {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<String>,
        temperature: f32,
        max_tokens: Option<u32>,
        max_retries: u32
    ) -> Result<Self, LlmError> {
        let inner = OpenAIChatClient::new(
            LlmType::Groq,
            api_key,
            model.unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            base_url.unwrap_or_else(|| GROQ_BASE_URL.to_string()),
            temperature,
            max_tokens,
            max_retries
        )?;
        Ok(Self { inner })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::NotConfigured("Groq API key is required".to_string()))?;

        Self::new(
            &api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.max_tokens,
            config.max_retries
        )
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.inner.invoke(messages).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        self.inner.stream(messages).await
    }

    fn model(&self) -> String {
        self.inner.model()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Groq
    }
}
