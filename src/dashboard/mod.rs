pub mod niche;

use log::{ info, warn };
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::prompt::PromptConfig;
use crate::history::{ HistoryError, HistoryStore };
use crate::llm::chat::ChatClient;
use crate::llm::LlmError;
use crate::models::chat::{ Message, StoredMessage };
use crate::models::trends::TrendReport;
use crate::trends::{ CpmSource, TrendsClient };

use self::niche::NicheFinder;

/// Persona key for an optional system turn on the chatbot page.
pub const TRENDS_ANALYST: &str = "trends_analyst";

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("Answer {required} questions first ({answered} answered so far)")]
    NotReady {
        answered: usize,
        required: usize,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatbotReply {
    pub reply: Option<String>,
    pub warning: Option<String>,
}

/// Builds the dashboard report for one keyword.
///
/// Regions are only requested when the time series has data. Failures are
/// reported in `warnings` and the affected part is left empty.
pub async fn analyze_keyword(trends: &dyn TrendsClient, keyword: &str) -> TrendReport {
    let keyword = keyword.trim();
    let mut report = TrendReport {
        keyword: keyword.to_string(),
        ..Default::default()
    };
    if keyword.is_empty() {
        report.warnings.push("Please enter a keyword.".to_string());
        return report;
    }

    match trends.interest_over_time(keyword).await {
        Ok(timeline) if timeline.is_empty() => {
            report.warnings.push("No trend data found for this keyword.".to_string());
        }
        Ok(timeline) => {
            report.timeline = Some(timeline);
        }
        Err(e) => {
            warn!("Trend fetch for '{}' failed: {}", keyword, e);
            report.warnings.push(format!("Error fetching trend data: {}", e));
        }
    }

    if report.timeline.is_some() {
        match trends.interest_by_region(keyword).await {
            Ok(regions) => {
                report.regions = Some(regions);
            }
            Err(e) => {
                warn!("Region fetch for '{}' failed: {}", keyword, e);
                report.warnings.push(format!("Error fetching interest by region: {}", e));
            }
        }
    }

    report
}

/// The three dashboard pages, sharing one chat client and one trends client.
pub struct Dashboard {
    chat: Arc<dyn ChatClient>,
    trends: Arc<dyn TrendsClient>,
    history: Arc<dyn HistoryStore>,
    prompts: Arc<PromptConfig>,
    niche: NicheFinder,
    turns: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Dashboard {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        trends: Arc<dyn TrendsClient>,
        cpm: Arc<dyn CpmSource>,
        history: Arc<dyn HistoryStore>,
        prompts: Arc<PromptConfig>
    ) -> Self {
        let niche = NicheFinder::new(
            Arc::clone(&chat),
            Arc::clone(&trends),
            cpm,
            Arc::clone(&prompts)
        );
        Self {
            chat,
            trends,
            history,
            prompts,
            niche,
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Serialises chatbot turns within one session.
    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut turns = self.turns.lock().await;
        Arc::clone(turns.entry(session_id.to_string()).or_default())
    }

    pub fn niche(&self) -> &NicheFinder {
        &self.niche
    }

    /// Time series plus regional breakdown for `keyword`, re-fetched on every call.
    pub async fn analyze_trends(&self, keyword: &str) -> TrendReport {
        analyze_keyword(self.trends.as_ref(), keyword).await
    }

    /// One chatbot turn. The whole session history goes to the model every time.
    ///
    /// The human turn is recorded before the model is called, so it stays in the
    /// history even when the call fails. Concurrent turns on the same session run
    /// one after the other.
    pub async fn ask(&self, session_id: &str, input: &str) -> Result<ChatbotReply, DashboardError> {
        if input.trim().is_empty() {
            return Ok(ChatbotReply {
                reply: None,
                warning: Some("Please enter a question.".to_string()),
            });
        }

        let turn = self.turn_lock(session_id).await;
        let _turn = turn.lock().await;

        self.history.add_message(session_id, &Message::human(input)).await?;
        let conversation = self.history.get_conversation(session_id, 0).await?;

        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if let Some(persona) = self.prompts.personas.get(TRENDS_ANALYST) {
            if !persona.trim().is_empty() {
                messages.push(Message::system(persona.as_str()));
            }
        }
        messages.extend(conversation.to_messages());

        info!("Chatbot session {} sending {} messages", session_id, messages.len());
        let response = self.chat.invoke(&messages).await?;
        let text = response.text();
        self.history.add_message(session_id, &Message::assistant(text.as_str())).await?;

        Ok(ChatbotReply { reply: Some(text), warning: None })
    }

    pub async fn chat_history(&self, session_id: &str) -> Result<Vec<StoredMessage>, DashboardError> {
        Ok(self.history.get_conversation(session_id, 0).await?.messages)
    }

    pub async fn reset_chat(&self, session_id: &str) -> Result<(), DashboardError> {
        let turn = self.turn_lock(session_id).await;
        let _turn = turn.lock().await;
        Ok(self.history.clear(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::llm::chat::mock::MockChatClient;
    use crate::models::chat::Role;
    use crate::llm::LlmType;
    use crate::models::chat::ChatResponse;
    use crate::trends::{ MockTrendsClient, StaticCpmTable };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers after a pause, naming the question and how much history it saw.
    struct SlowEcho;

    #[async_trait]
    impl ChatClient for SlowEcho {
        async fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, LlmError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse::from_text("slow", format!("re: {} (saw {})", last, messages.len())))
        }

        fn model(&self) -> String {
            "slow".to_string()
        }

        fn llm_type(&self) -> LlmType {
            LlmType::Ollama
        }
    }

    fn dashboard(chat: Arc<MockChatClient>, trends: Arc<MockTrendsClient>) -> Dashboard {
        Dashboard::new(
            chat,
            trends,
            Arc::new(StaticCpmTable(Vec::new())),
            Arc::new(MemoryHistoryStore::new()),
            Arc::new(PromptConfig::default())
        )
    }

    #[tokio::test]
    async fn trend_report_has_timeline_and_regions() {
        let trends = Arc::new(MockTrendsClient::sample());
        let d = dashboard(Arc::new(MockChatClient::new()), Arc::clone(&trends));
        let report = d.analyze_trends(" AI Technology ").await;
        assert_eq!(report.keyword, "AI Technology");
        assert_eq!(report.timeline.unwrap().len(), 3);
        assert_eq!(report.regions.unwrap()[0].geo_name, "United States");
        assert!(report.warnings.is_empty());
        assert_eq!(trends.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_timeline_skips_regions() {
        let trends = Arc::new(MockTrendsClient::new(Some(Vec::new()), Some(Vec::new())));
        let d = dashboard(Arc::new(MockChatClient::new()), Arc::clone(&trends));
        let report = d.analyze_trends("zzz").await;
        assert!(report.timeline.is_none());
        assert!(report.regions.is_none());
        assert_eq!(report.warnings, vec!["No trend data found for this keyword."]);
        assert_eq!(trends.call_count(), 1);
    }

    #[tokio::test]
    async fn region_failure_keeps_partial_report() {
        let sample = MockTrendsClient::sample();
        let timeline = sample.interest_over_time("x").await.unwrap();
        let trends = Arc::new(MockTrendsClient::new(Some(timeline), None));
        let d = dashboard(Arc::new(MockChatClient::new()), trends);
        let report = d.analyze_trends("x").await;
        assert!(report.timeline.is_some());
        assert!(report.regions.is_none());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Error fetching interest by region"));
    }

    #[tokio::test]
    async fn blank_keyword_is_a_warning() {
        let trends = Arc::new(MockTrendsClient::sample());
        let report = analyze_keyword(trends.as_ref(), "  ").await;
        assert_eq!(report.warnings, vec!["Please enter a keyword."]);
        assert_eq!(trends.call_count(), 0);
    }

    #[tokio::test]
    async fn trend_failure_is_a_warning() {
        let trends = MockTrendsClient::new(None, None);
        let report = analyze_keyword(&trends, "x").await;
        assert!(report.timeline.is_none());
        assert_eq!(report.warnings, vec!["Error fetching trend data: Trends API error: trends unavailable"]);
    }

    #[tokio::test]
    async fn every_call_refetches() {
        let trends = Arc::new(MockTrendsClient::sample());
        let d = dashboard(Arc::new(MockChatClient::new()), Arc::clone(&trends));
        d.analyze_trends("x").await;
        d.analyze_trends("x").await;
        assert_eq!(trends.call_count(), 4);
    }

    #[tokio::test]
    async fn chatbot_grows_history_without_truncation() {
        let chat = Arc::new(MockChatClient::with_replies(["first", "second"]));
        let d = dashboard(Arc::clone(&chat), Arc::new(MockTrendsClient::sample()));

        let r1 = d.ask("s", "What is trending?").await.unwrap();
        assert_eq!(r1.reply.as_deref(), Some("first"));
        d.ask("s", "And in India?").await.unwrap();

        let calls = chat.calls();
        assert_eq!(calls[0], vec![Message::human("What is trending?")]);
        assert_eq!(calls[1].len(), 3);
        assert_eq!(calls[1][1], Message::assistant("first"));

        let history = d.chat_history("s").await.unwrap();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Human, Role::Assistant, Role::Human, Role::Assistant]);
    }

    #[tokio::test]
    async fn empty_question_warns_without_calling_model() {
        let chat = Arc::new(MockChatClient::new());
        let d = dashboard(Arc::clone(&chat), Arc::new(MockTrendsClient::sample()));
        let reply = d.ask("s", "   ").await.unwrap();
        assert_eq!(reply.warning.as_deref(), Some("Please enter a question."));
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_call_keeps_human_turn() {
        let chat = Arc::new(MockChatClient::new());
        chat.push_failure("boom");
        let d = dashboard(Arc::clone(&chat), Arc::new(MockTrendsClient::sample()));
        assert!(d.ask("s", "hello").await.is_err());
        let history = d.chat_history("s").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_do_not_interleave() {
        let d = Dashboard::new(
            Arc::new(SlowEcho),
            Arc::new(MockTrendsClient::sample()),
            Arc::new(StaticCpmTable(Vec::new())),
            Arc::new(MemoryHistoryStore::new()),
            Arc::new(PromptConfig::default())
        );
        let (a, b) = tokio::join!(d.ask("s", "first"), d.ask("s", "second"));
        assert_eq!(a.unwrap().reply.as_deref(), Some("re: first (saw 1)"));
        assert_eq!(b.unwrap().reply.as_deref(), Some("re: second (saw 3)"));

        let history: Vec<Message> = d
            .chat_history("s").await
            .unwrap()
            .into_iter()
            .map(Message::from)
            .collect();
        assert_eq!(
            history,
            vec![
                Message::human("first"),
                Message::assistant("re: first (saw 1)"),
                Message::human("second"),
                Message::assistant("re: second (saw 3)")
            ]
        );
    }
}
