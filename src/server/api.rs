use axum::{
    extract::{ Path, State },
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;

use crate::config::prompt::{ build_messages, PromptConfig, AGENT_47 };
use crate::dashboard::{ Dashboard, DashboardError };
use crate::llm::chat::ChatClient;
use crate::llm::LlmError;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatClient>,
    pub prompts: Arc<PromptConfig>,
    pub dashboard: Arc<Dashboard>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Deserialize)]
pub struct TrendsRequest {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Deserialize)]
pub struct ChatbotRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct ChatbotResponse {
    session_id: String,
    reply: Option<String>,
    warning: Option<String>,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub answer: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: err.to_string() }
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        let status = match &err {
            DashboardError::NotReady { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/api/trends", post(trends_handler))
        .route("/api/chatbot", post(chatbot_handler))
        .route("/api/chatbot/{session_id}", get(chatbot_history_handler).delete(chatbot_reset_handler))
        .route("/api/niche/{session_id}", get(niche_status_handler).delete(niche_reset_handler))
        .route("/api/niche/{session_id}/answer", post(niche_answer_handler))
        .route("/api/niche/{session_id}/suggestions", get(niche_suggestions_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatReply>, ApiError> {
    let system = state.prompts.persona(AGENT_47).unwrap_or_default();
    let messages = build_messages(system, &req.message);
    let result = state.chat.invoke(&messages).await?;
    Ok(Json(ChatReply { response: result.text() }))
}

async fn trends_handler(
    State(state): State<AppState>,
    Json(req): Json<TrendsRequest>
) -> impl IntoResponse {
    info!("Analyzing trends for '{}'", req.keyword);
    Json(state.dashboard.analyze_trends(&req.keyword).await)
}

async fn chatbot_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatbotRequest>
) -> Result<impl IntoResponse, ApiError> {
    let session_id = req.session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let reply = state.dashboard.ask(&session_id, &req.message).await?;
    Ok(
        Json(ChatbotResponse {
            session_id,
            reply: reply.reply,
            warning: reply.warning,
        })
    )
}

async fn chatbot_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.dashboard.chat_history(&session_id).await?;
    Ok(Json(json!({ "session_id": session_id, "messages": messages })))
}

async fn chatbot_reset_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<StatusCode, ApiError> {
    state.dashboard.reset_chat(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn niche_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboard.niche().current(&session_id).await?))
}

async fn niche_answer_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<AnswerRequest>
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboard.niche().answer(&session_id, &req.answer).await?))
}

async fn niche_suggestions_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.dashboard.niche().suggestions(&session_id).await?))
}

async fn niche_reset_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> StatusCode {
    state.dashboard.niche().reset(&session_id).await;
    StatusCode::NO_CONTENT
}
