pub mod commands;

use clap::{ Parser, Subcommand };

use crate::config::prompt::MATH_MENTOR;
use crate::history::HistoryConfig;
use crate::llm::{ LlmConfig, LlmType, ParseLlmTypeError };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (groq, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq", global = true)]
    pub chat_llm_type: String,

    /// API Key for the chat provider. Falls back to GROQ_API_KEY / OPENAI_API_KEY.
    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true, global = true)]
    pub chat_api_key: Option<String>,

    #[arg(long, env = "GROQ_API_KEY", hide = true, hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide = true, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Model name for chat completion (e.g., mixtral-8x7b-32768, llama3-8b-8192, gpt-4o)
    #[arg(long, env = "CHAT_MODEL", global = true)] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Base URL for the chat provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL", global = true)]
    pub chat_base_url: Option<String>,

    /// Sampling temperature.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.0", global = true)]
    pub chat_temperature: f32,

    /// Upper bound on generated tokens. Provider default if unset.
    #[arg(long, env = "CHAT_MAX_TOKENS", global = true)]
    pub chat_max_tokens: Option<u32>,

    /// Extra attempts after a transient provider failure (429, 5xx, connection errors).
    #[arg(long, env = "CHAT_MAX_RETRIES", default_value = "2", global = true)]
    pub chat_max_retries: u32,

    // --- Trends Args ---
    /// SerpAPI key used for Google Trends lookups.
    #[arg(long, env = "SERPAPI_API_KEY", hide_env_values = true, global = true)]
    pub serpapi_api_key: Option<String>,

    /// Base URL of the SerpAPI endpoint.
    #[arg(long, env = "TRENDS_BASE_URL", global = true)]
    pub trends_base_url: Option<String>,

    /// Google Trends timeframe (e.g., "now 7-d", "today 12-m").
    #[arg(long, env = "TRENDS_TIMEFRAME", default_value = "now 7-d", global = true)]
    pub trends_timeframe: String,

    /// Google Trends geography. Empty means worldwide.
    #[arg(long, env = "TRENDS_GEO", default_value = "", global = true)]
    pub trends_geo: String,

    /// Page listing niche CPM figures.
    #[arg(long, env = "CPM_SOURCE_URL", global = true)]
    pub cpm_source_url: Option<String>,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory", global = true)]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379", global = true)]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "history:", global = true)]
    pub history_redis_prefix: String,

    /// Project the chat history collection belongs to.
    #[arg(long, env = "HISTORY_PROJECT_ID", default_value = "trendbot", global = true)]
    pub history_project_id: String,

    // --- General App Args ---
    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json", global = true)]
    pub prompts_path: String,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:5000", global = true)]
    pub server_addr: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false", global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP chat endpoint and dashboard API (default).
    Serve,
    /// Read one question from stdin and print the raw model response.
    Ask {
        /// Persona used as the system instruction.
        #[arg(long, default_value = MATH_MENTOR)]
        persona: String,
    },
    /// Send a bare prompt and print the raw model response.
    Invoke {
        prompt: String,
    },
    /// Translate English text into Italian.
    Translate {
        text: String,
    },
    /// Interactive chat with history kept in the configured store.
    Chat {
        #[arg(long, env = "HISTORY_SESSION_ID", default_value = "new_user_session")]
        session: String,
        /// Optional persona used as the system instruction.
        #[arg(long)]
        persona: Option<String>,
    },
    /// Print interest over time and by region for a keyword.
    Trends {
        keyword: String,
    },
    /// Print the best-paying content niches by CPM.
    Niches {
        #[arg(long, default_value_t = 3)]
        top: usize,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn llm_config(&self) -> Result<LlmConfig, ParseLlmTypeError> {
        let llm_type: LlmType = self.chat_llm_type.parse()?;
        let provider_key = match llm_type {
            LlmType::Groq => self.groq_api_key.clone(),
            LlmType::OpenAI => self.openai_api_key.clone(),
            LlmType::Ollama => None,
        };
        let api_key = self.chat_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or(provider_key)
            .filter(|k| !k.trim().is_empty());

        Ok(LlmConfig {
            llm_type,
            api_key,
            model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
            temperature: self.chat_temperature,
            max_tokens: self.chat_max_tokens,
            max_retries: self.chat_max_retries,
        })
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            store_type: self.history_type.clone(),
            host: self.history_host.clone(),
            key_prefix: self.history_redis_prefix.clone(),
            project_id: self.history_project_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["trendbot"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn serve_is_the_default_command() {
        let args = parse(&["--chat-api-key", "k"]);
        assert_eq!(args.command(), Command::Serve);
    }

    #[test]
    fn explicit_chat_key_wins_over_provider_key() {
        let args = parse(&["--chat-api-key", "explicit", "--groq-api-key", "groq", "ask"]);
        let config = args.llm_config().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("explicit"));
        assert_eq!(args.command(), Command::Ask { persona: MATH_MENTOR.to_string() });
    }

    #[test]
    fn provider_key_is_used_when_chat_key_blank() {
        let args = parse(&["--chat-api-key", " ", "--openai-api-key", "sk", "--chat-llm-type", "openai"]);
        let config = args.llm_config().unwrap();
        assert_eq!(config.llm_type, LlmType::OpenAI);
        assert_eq!(config.api_key.as_deref(), Some("sk"));
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let args = parse(&["trends", "rust", "--trends-timeframe", "today 12-m"]);
        assert_eq!(args.command(), Command::Trends { keyword: "rust".into() });
        assert_eq!(args.trends_timeframe, "today 12-m");
    }

    #[test]
    fn bad_provider_is_rejected() {
        let args = parse(&["--chat-llm-type", "gemini"]);
        assert!(args.llm_config().is_err());
    }
}
