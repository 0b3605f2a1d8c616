use log::{ info, warn };
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::DashboardError;
use crate::config::prompt::PromptConfig;
use crate::llm::chat::ChatClient;
use crate::models::chat::Message;
use crate::models::trends::{ NicheCpm, RegionInterest };
use crate::trends::{ top_niches, CpmSource, TrendsClient };

pub const QUESTION_COUNT: usize = 5;
pub const SUGGESTION_COUNT: usize = 3;

/// Questions asked so far and the answers given to them.
#[derive(Debug, Clone)]
pub struct NicheSession {
    questions: Vec<Message>,
    answers: Vec<String>,
    pending: Option<String>,
}

impl NicheSession {
    fn new(seed: &str) -> Self {
        Self {
            questions: vec![Message::system(seed)],
            answers: Vec::new(),
            pending: None,
        }
    }

    fn is_complete(&self) -> bool {
        self.answers.len() >= QUESTION_COUNT
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NicheStatus {
    pub question: Option<String>,
    pub answers: Vec<String>,
    pub complete: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NicheSuggestions {
    pub niches: Vec<NicheCpm>,
    pub keyword: String,
    pub audience: Option<Vec<RegionInterest>>,
    pub warnings: Vec<String>,
}

/// The "Find My Niche" page: five generated questions, then CPM-ranked suggestions.
pub struct NicheFinder {
    chat: Arc<dyn ChatClient>,
    trends: Arc<dyn TrendsClient>,
    cpm: Arc<dyn CpmSource>,
    prompts: Arc<PromptConfig>,
    sessions: Mutex<HashMap<String, Arc<Mutex<NicheSession>>>>,
}

impl NicheFinder {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        trends: Arc<dyn TrendsClient>,
        cpm: Arc<dyn CpmSource>,
        prompts: Arc<PromptConfig>
    ) -> Self {
        Self {
            chat,
            trends,
            cpm,
            prompts,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<NicheSession>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(NicheSession::new(&self.prompts.niche_seed))))
        )
    }

    async fn generate_question(&self, history: &[Message]) -> Result<String, DashboardError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(self.prompts.niche_questions.as_str()));
        messages.extend_from_slice(history);
        let response = self.chat.invoke(&messages).await?;
        Ok(response.text().trim().to_string())
    }

    async fn ensure_question(&self, state: &mut NicheSession) -> Result<(), DashboardError> {
        if state.pending.is_none() && !state.is_complete() {
            let question = self.generate_question(&state.questions).await?;
            state.questions.push(Message::assistant(question.as_str()));
            state.pending = Some(question);
        }
        Ok(())
    }

    fn status(state: &NicheSession, warning: Option<String>) -> NicheStatus {
        NicheStatus {
            question: state.pending.clone(),
            answers: state.answers.clone(),
            complete: state.is_complete(),
            warning,
        }
    }

    /// The question waiting for an answer, generating one if needed.
    pub async fn current(&self, session_id: &str) -> Result<NicheStatus, DashboardError> {
        let session = self.session(session_id).await;
        let mut state = session.lock().await;
        self.ensure_question(&mut state).await?;
        Ok(Self::status(&state, None))
    }

    /// Records an answer and moves on to the next question.
    ///
    /// If generating the next question fails, the answer is not recorded.
    pub async fn answer(&self, session_id: &str, answer: &str) -> Result<NicheStatus, DashboardError> {
        let session = self.session(session_id).await;
        let mut state = session.lock().await;

        let answer = answer.trim();
        if answer.is_empty() {
            self.ensure_question(&mut state).await?;
            return Ok(Self::status(&state, Some("Please enter an answer.".to_string())));
        }
        if state.is_complete() {
            return Ok(Self::status(&state, Some("All questions already answered.".to_string())));
        }

        // The answer is only committed once the follow-up question exists, so a
        // failed call leaves the session as it was and the answer can be resent.
        let mut history = state.questions.clone();
        history.push(Message::human(answer));
        let next = if state.answers.len() + 1 < QUESTION_COUNT {
            Some(self.generate_question(&history).await?)
        } else {
            None
        };

        state.answers.push(answer.to_string());
        state.questions = history;
        state.pending = None;
        if let Some(question) = next {
            state.questions.push(Message::assistant(question.as_str()));
            state.pending = Some(question);
        }
        info!("Niche session {} has {}/{} answers", session_id, state.answers.len(), QUESTION_COUNT);

        Ok(Self::status(&state, None))
    }

    /// Top CPM niches plus the audience for the first answer, once every question is answered.
    ///
    /// The CPM page is scraped fresh each time; it does not depend on the answers.
    pub async fn suggestions(&self, session_id: &str) -> Result<NicheSuggestions, DashboardError> {
        let keyword = {
            let session = self.session(session_id).await;
            let state = session.lock().await;
            if !state.is_complete() {
                return Err(DashboardError::NotReady {
                    answered: state.answers.len(),
                    required: QUESTION_COUNT,
                });
            }
            state.answers[0].clone()
        };

        let mut warnings = Vec::new();
        let niches = match self.cpm.fetch().await {
            Ok(table) => top_niches(&table, SUGGESTION_COUNT),
            Err(e) => {
                warn!("CPM fetch failed: {}", e);
                warnings.push(format!("Error fetching CPM data: {}", e));
                Vec::new()
            }
        };

        let audience = match self.trends.interest_by_region(&keyword).await {
            Ok(regions) => Some(regions),
            Err(e) => {
                warn!("Audience fetch for '{}' failed: {}", keyword, e);
                warnings.push(format!("Error fetching interest by region: {}", e));
                None
            }
        };

        Ok(NicheSuggestions { niches, keyword, audience, warnings })
    }

    pub async fn reset(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::mock::MockChatClient;
    use crate::models::chat::Role;
    use crate::trends::{ MockTrendsClient, StaticCpmTable, TrendsError };
    use async_trait::async_trait;

    fn cpm_table() -> Vec<NicheCpm> {
        vec![
            NicheCpm { niche: "Gaming".into(), cpm: 3.0 },
            NicheCpm { niche: "Finance".into(), cpm: 12.5 },
            NicheCpm { niche: "Tech".into(), cpm: 9.75 },
            NicheCpm { niche: "Education".into(), cpm: 7.0 }
        ]
    }

    fn finder(chat: Arc<MockChatClient>, cpm: Arc<dyn CpmSource>) -> NicheFinder {
        NicheFinder::new(
            chat,
            Arc::new(MockTrendsClient::sample()),
            cpm,
            Arc::new(PromptConfig::default())
        )
    }

    struct BrokenCpm;

    #[async_trait]
    impl CpmSource for BrokenCpm {
        async fn fetch(&self) -> Result<Vec<NicheCpm>, TrendsError> {
            Err(TrendsError::Api("page moved".into()))
        }
    }

    #[tokio::test]
    async fn current_question_is_generated_once() {
        let chat = Arc::new(MockChatClient::with_replies(["  What do you enjoy?  "]));
        let f = finder(Arc::clone(&chat), Arc::new(StaticCpmTable(cpm_table())));

        let first = f.current("s").await.unwrap();
        assert_eq!(first.question.as_deref(), Some("What do you enjoy?"));
        let again = f.current("s").await.unwrap();
        assert_eq!(again.question, first.question);
        assert_eq!(chat.call_count(), 1);

        let sent = &chat.calls()[0];
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, PromptConfig::default().niche_questions);
        assert_eq!(sent[1], Message::system(PromptConfig::default().niche_seed));
    }

    #[tokio::test]
    async fn five_answers_complete_the_session() {
        let chat = Arc::new(MockChatClient::new());
        let f = finder(Arc::clone(&chat), Arc::new(StaticCpmTable(cpm_table())));

        f.current("s").await.unwrap();
        let mut status = None;
        for answer in ["cooking", "English", "India", "video", "weekly"] {
            status = Some(f.answer("s", answer).await.unwrap());
        }
        let status = status.unwrap();
        assert!(status.complete);
        assert_eq!(status.question, None);
        assert_eq!(status.answers.len(), QUESTION_COUNT);
        // one opening question plus one after each of the first four answers
        assert_eq!(chat.call_count(), 5);

        let extra = f.answer("s", "more").await.unwrap();
        assert!(extra.warning.is_some());
        assert_eq!(extra.answers.len(), QUESTION_COUNT);
    }

    #[tokio::test]
    async fn answers_feed_the_next_question() {
        let chat = Arc::new(MockChatClient::with_replies(["Q1", "Q2"]));
        let f = finder(Arc::clone(&chat), Arc::new(StaticCpmTable(cpm_table())));
        f.current("s").await.unwrap();
        let status = f.answer("s", "cooking").await.unwrap();
        assert_eq!(status.question.as_deref(), Some("Q2"));

        let sent = chat.calls().pop().unwrap();
        assert_eq!(sent[sent.len() - 2], Message::assistant("Q1"));
        assert_eq!(sent[sent.len() - 1], Message::human("cooking"));
    }

    #[tokio::test]
    async fn failed_follow_up_leaves_answer_unrecorded() {
        let chat = Arc::new(MockChatClient::with_replies(["Q1"]));
        chat.push_failure("overloaded");
        let f = finder(Arc::clone(&chat), Arc::new(StaticCpmTable(cpm_table())));
        f.current("s").await.unwrap();

        assert!(f.answer("s", "cooking").await.is_err());
        let status = f.current("s").await.unwrap();
        assert!(status.answers.is_empty());
        assert_eq!(status.question.as_deref(), Some("Q1"));

        let status = f.answer("s", "cooking").await.unwrap();
        assert_eq!(status.answers, vec!["cooking"]);
        let sent = chat.calls().pop().unwrap();
        let human_turns = sent.iter().filter(|m| m.role == Role::Human).count();
        assert_eq!(human_turns, 1);
    }

    #[tokio::test]
    async fn blank_answer_is_not_recorded() {
        let chat = Arc::new(MockChatClient::new());
        let f = finder(chat, Arc::new(StaticCpmTable(cpm_table())));
        let status = f.answer("s", "  ").await.unwrap();
        assert!(status.answers.is_empty());
        assert_eq!(status.warning.as_deref(), Some("Please enter an answer."));
        assert!(status.question.is_some());
    }

    #[tokio::test]
    async fn suggestions_wait_for_all_answers() {
        let f = finder(Arc::new(MockChatClient::new()), Arc::new(StaticCpmTable(cpm_table())));
        f.answer("s", "cooking").await.unwrap();
        match f.suggestions("s").await {
            Err(DashboardError::NotReady { answered, required }) => {
                assert_eq!(answered, 1);
                assert_eq!(required, QUESTION_COUNT);
            }
            other => panic!("expected NotReady, got {:?}", other.map(|s| s.keyword)),
        }
    }

    #[tokio::test]
    async fn suggestions_rank_cpm_and_use_first_answer() {
        let f = finder(Arc::new(MockChatClient::new()), Arc::new(StaticCpmTable(cpm_table())));
        for answer in ["cooking", "English", "India", "video", "weekly"] {
            f.answer("s", answer).await.unwrap();
        }
        let s = f.suggestions("s").await.unwrap();
        let names: Vec<_> = s.niches.iter().map(|n| n.niche.as_str()).collect();
        assert_eq!(names, vec!["Finance", "Tech", "Education"]);
        assert_eq!(s.keyword, "cooking");
        assert!(s.audience.is_some());
        assert!(s.warnings.is_empty());
    }

    #[tokio::test]
    async fn cpm_failure_becomes_warning() {
        let f = finder(Arc::new(MockChatClient::new()), Arc::new(BrokenCpm));
        for answer in ["a", "b", "c", "d", "e"] {
            f.answer("s", answer).await.unwrap();
        }
        let s = f.suggestions("s").await.unwrap();
        assert!(s.niches.is_empty());
        assert_eq!(s.warnings, vec!["Error fetching CPM data: Trends API error: page moved"]);
    }

    #[tokio::test]
    async fn reset_starts_over() {
        let f = finder(Arc::new(MockChatClient::new()), Arc::new(StaticCpmTable(cpm_table())));
        f.answer("s", "a").await.unwrap();
        f.reset("s").await;
        assert!(f.current("s").await.unwrap().answers.is_empty());
    }
}
