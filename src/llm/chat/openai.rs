use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

use super::{ check_status, create_streaming_response, next_line, with_retries, ChatClient, TokenStream };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::{ ChatResponse, Message, TokenUsage };

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format.
pub struct OpenAIChatClient {
    http: HttpClient,
    provider: LlmType,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

enum SseLine {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() {
        return SseLine::Skip;
    }
    if line == "data: [DONE]" {
        return SseLine::Done;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    match serde_json::from_str::<StreamChunk>(data.trim()) {
        Ok(chunk) => {
            let mut text = String::new();
            let mut finished = false;
            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    text.push_str(&content);
                }
                if choice.finish_reason.as_deref() == Some("stop") {
                    finished = true;
                }
            }
            match (text.is_empty(), finished) {
                (false, _) => SseLine::Token(text),
                (true, true) => SseLine::Done,
                (true, false) => SseLine::Skip,
            }
        }
        Err(e) => {
            debug!("Failed to parse stream chunk: {}, error: {}", data, e);
            SseLine::Skip
        }
    }
}

impl OpenAIChatClient {
    pub fn new(
        provider: LlmType,
        api_key: &str,
        model: String,
        base_url: String,
        temperature: f32,
        max_tokens: Option<u32>,
        max_retries: u32
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                LlmError::NotConfigured(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            provider,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            max_tokens,
            max_retries,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::NotConfigured("OpenAI API key is required".to_string()))?;

        Self::new(
            LlmType::OpenAI,
            &api_key,
            config.model.clone().unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            config.temperature,
            config.max_tokens,
            config.max_retries
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send_once(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        let req = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: None,
        };

        let resp = self.http.post(self.completions_url()).json(&req).send().await?;
        let raw: JsonValue = check_status(resp).await?.json().await?;
        let parsed: CompletionResponse = serde_json
            ::from_value(raw.clone())
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;

        Ok(ChatResponse {
            content: choice.message.content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            usage: parsed.usage,
            raw,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        let label = self.provider.to_string();
        with_retries(self.max_retries, &label, || self.send_once(messages)).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let url = self.completions_url();
        let req = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: Some(true),
        };
        let body = serde_json::to_value(&req).map_err(|e| LlmError::Parse(e.to_string()))?;

        info!("Starting {} stream request to {}", self.provider, url);
        let label = self.provider.to_string();
        let (http, url, body) = (&self.http, url.as_str(), &body);
        let resp = with_retries(self.max_retries, &label, || async move {
            let resp = http.post(url).json(body).send().await?;
            check_status(resp).await
        }).await?;

        Ok(
            create_streaming_response(move |tx| async move {
                let mut bytes = resp.bytes_stream();
                let mut buffer: Vec<u8> = Vec::new();
                while let Some(chunk) = bytes.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx.send(Err(LlmError::Http(e))).await;
                            return;
                        }
                    };
                    buffer.extend_from_slice(&chunk);
                    while let Some(line) = next_line(&mut buffer) {
                        match parse_sse_line(&line) {
                            SseLine::Token(token) => {
                                if tx.send(Ok(token)).await.is_err() {
                                    return;
                                }
                            }
                            SseLine::Done => {
                                return;
                            }
                            SseLine::Skip => {}
                        }
                    }
                }
                if let SseLine::Token(token) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    let _ = tx.send(Ok(token)).await;
                }
            })
        )
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_line_with_delta_is_a_token() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert!(matches!(parse_sse_line(line), SseLine::Token(t) if t == "Hel"));
    }

    #[test]
    fn done_marker_ends_stream() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        let stop = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(parse_sse_line(stop), SseLine::Done));
    }

    #[test]
    fn comments_and_garbage_are_skipped() {
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: {not json"), SseLine::Skip));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
    }

    #[test]
    fn request_omits_unset_fields() {
        let messages = vec![Message::system("s"), Message::human("u")];
        let req = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.0,
            max_tokens: None,
            stream: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"][1]["role"], "user");
    }
}
