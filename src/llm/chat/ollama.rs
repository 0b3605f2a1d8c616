use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

use super::{ check_status, create_streaming_response, next_line, with_retries, ChatClient, TokenStream };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::{ ChatResponse, Message, TokenUsage };

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        temperature: f32,
        max_tokens: Option<u32>,
        max_retries: u32
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.into());
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            temperature,
            max_tokens,
            max_retries,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::NotConfigured("Invalid config type for OllamaClient".into()));
        }
        Ok(
            Self::new(
                config.base_url.clone(),
                config.model.clone(),
                config.temperature,
                config.max_tokens,
                config.max_retries
            )
        )
    }

    fn request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            stream,
            options: Options {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }

    async fn send_once(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self.http.post(&url).json(&self.request(messages, false)).send().await?;
        let raw: JsonValue = check_status(resp).await?.json().await?;
        let reply: ChatReply = serde_json
            ::from_value(raw.clone())
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let usage = match (reply.prompt_eval_count, reply.eval_count) {
            (Some(prompt), Some(completion)) =>
                Some(TokenUsage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                }),
            _ => None,
        };

        Ok(ChatResponse {
            content: reply.message.and_then(|m| m.content),
            model: reply.model.unwrap_or_else(|| self.model.clone()),
            usage,
            raw,
        })
    }
}

fn parse_ndjson_line(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ChatReply>(line) {
        Ok(reply) => {
            let text = reply.message.and_then(|m| m.content).unwrap_or_default();
            Some((text, reply.done))
        }
        Err(e) => {
            debug!("Failed to parse Ollama chunk: {}, error: {}", line, e);
            None
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        with_retries(self.max_retries, "ollama", || self.send_once(messages)).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = serde_json
            ::to_value(self.request(messages, true))
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        info!("Starting Ollama stream request to {}", url);

        let (http, url, body) = (&self.http, url.as_str(), &body);
        let resp = with_retries(self.max_retries, "ollama", || async move {
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
                        if let Some((text, done)) = parse_ndjson_line(&line) {
                            if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                            if done {
                                return;
                            }
                        }
                    }
                }
                if let Some((text, _)) = parse_ndjson_line(&String::from_utf8_lossy(&buffer)) {
                    if !text.is_empty() {
                        let _ = tx.send(Ok(text)).await;
                    }
                }
            })
        )
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{ Body, Bytes };
    use axum::{ routing::post, Json, Router };
    use serde_json::{ json, Value };

    async fn chat(Json(body): Json<Value>) -> Body {
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["messages"][0]["role"], "system");
        if body["stream"] == json!(false) {
            let reply = json!({
                "model": "llama3",
                "message": { "role": "assistant", "content": "Ciao, mondo" },
                "done": true,
                "prompt_eval_count": 12,
                "eval_count": 4
            });
            return Body::from(reply.to_string());
        }
        let ndjson = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Un \"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"caffè\"},\"done\":false}\n",
            "{\"done\":true,\"eval_count\":2}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ignored\"},\"done\":false}\n"
        ).as_bytes();
        // cut inside the two-byte `è`
        let cut = ndjson.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let chunks = vec![Bytes::copy_from_slice(&ndjson[..cut]), Bytes::copy_from_slice(&ndjson[cut..])];
        let paced = futures::stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(chunk)
        });
        Body::from_stream(paced)
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/api/chat", post(chat));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn messages() -> Vec<Message> {
        vec![Message::system("Translate the following from English into Italian"), Message::human("A coffee")]
    }

    #[tokio::test]
    async fn invoke_reads_message_and_token_counts() {
        let client = OllamaClient::new(Some(spawn_upstream().await), None, 0.0, None, 0);
        let resp = client.invoke(&messages()).await.unwrap();
        assert_eq!(resp.text(), "Ciao, mondo");
        assert_eq!(resp.model, "llama3");
        assert_eq!(resp.usage.unwrap().total_tokens, 16);
    }

    #[tokio::test]
    async fn stream_stops_at_done_and_keeps_split_characters() {
        let client = OllamaClient::new(Some(spawn_upstream().await), None, 0.0, None, 0);
        let stream = client.stream(&messages()).await.unwrap();
        let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(tokens, vec!["Un ", "caffè"]);
    }

    #[test]
    fn ndjson_chunk_carries_text_and_done_flag() {
        let line = r#"{"model":"llama3","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_ndjson_line(line), Some(("Hi".to_string(), false)));
        let last = r#"{"model":"llama3","done":true,"eval_count":3}"#;
        assert_eq!(parse_ndjson_line(last), Some((String::new(), true)));
    }

    #[test]
    fn options_map_max_tokens_to_num_predict() {
        let client = OllamaClient::new(None, None, 0.5, Some(64), 0);
        let messages = [Message::human("x")];
        let json = serde_json::to_value(client.request(&messages, false)).unwrap();
        assert_eq!(json["options"]["num_predict"], 64);
        assert_eq!(json["model"], DEFAULT_OLLAMA_MODEL);
        assert_eq!(json["stream"], false);
    }
}
