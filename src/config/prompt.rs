use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use log::info;

use crate::models::chat::Message;

pub const AGENT_47: &str = "agent47";
pub const MATH_MENTOR: &str = "math_mentor";
pub const TRANSLATOR: &str = "translator";

const AGENT_47_PROMPT: &str = "You are Agent 47 Hitman";
const MATH_MENTOR_PROMPT: &str =
    "You are a professional Mathematics mentor and you only answer questions related to mathematics correctly. Don't answer any questions or queries apart from mathematics.";
const TRANSLATOR_PROMPT: &str = "Translate the following from English into Italian";
const NICHE_QUESTIONS_PROMPT: &str =
    "Generate dynamic questions to find the best niche for content creation based on user responses.";
const NICHE_SEED_PROMPT: &str = "Start niche-finding conversation.";

#[derive(Debug)]
pub enum PromptError {
    PersonaNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::PersonaNotFound(key) => write!(f, "Persona '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Default)]
struct PromptFile {
    #[serde(default)]
    personas: HashMap<String, String>,
    niche_questions: Option<String>,
    niche_seed: Option<String>,
}

/// System instructions used across the chat surfaces.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub personas: HashMap<String, String>,
    pub niche_questions: String,
    pub niche_seed: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let personas = [
            (AGENT_47, AGENT_47_PROMPT),
            (MATH_MENTOR, MATH_MENTOR_PROMPT),
            (TRANSLATOR, TRANSLATOR_PROMPT),
        ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            personas,
            niche_questions: NICHE_QUESTIONS_PROMPT.to_string(),
            niche_seed: NICHE_SEED_PROMPT.to_string(),
        }
    }
}

impl PromptConfig {
    pub fn persona(&self, name: &str) -> Result<&str, PromptError> {
        self.personas
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| PromptError::PersonaNotFound(name.to_string()))
    }

    fn merge(mut self, file: PromptFile) -> Self {
        self.personas.extend(file.personas);
        if let Some(niche_questions) = file.niche_questions {
            self.niche_questions = niche_questions;
        }
        if let Some(niche_seed) = file.niche_seed {
            self.niche_seed = niche_seed;
        }
        self
    }
}

/// `[system, human]`, dropping the system turn when the instruction is blank.
pub fn build_messages(system: &str, user: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system.trim().is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::human(user));
    messages
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let file: PromptFile = serde_json::from_str(json)?;
    Ok(Arc::new(PromptConfig::default().merge(file)))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let content = fs::read_to_string(path)?;
    load_prompts_from_str(&content)
}

/// Like `load_prompts`, but a missing file yields the built-in prompts.
pub fn load_prompts_or_default<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    match load_prompts(&path) {
        Err(PromptError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            info!("No prompts file at {}, using built-in prompts", path.as_ref().display());
            Ok(Arc::new(PromptConfig::default()))
        }
        other => other,
    }
}
