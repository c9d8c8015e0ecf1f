//! Environment-backed configuration
//!
//! Collects every tuned constant of the assistant into one struct so the
//! heuristics stay adjustable without code changes.

use std::env;
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal finance assistant. \
You may answer the user directly, or request backend actions by emitting \
directive lines (GET_TRANSACTIONS, NEW_TRANSACTION, EDIT_TRANSACTION, \
DELETE_TRANSACTION, NEW_TRANSFER). Use ids from the state snapshot below.";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Backend API URL offered during registration.
    pub default_api_url: String,
    /// Whether registration accepts a user-supplied server URL.
    pub allow_custom_url: bool,

    /// LLM service settings; `llm_enabled` gates the whole orchestration loop.
    pub llm_enabled: bool,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub system_prompt: String,

    /// Hard bound on model invocations per chat turn.
    pub max_llm_runs: u32,
    /// Ring-buffer capacity of the conversation context.
    pub context_capacity: usize,

    /// Cache staleness window for the polling fallback.
    pub refresh_window: Duration,
    /// How long to wait for the update channel's auth acknowledgement.
    pub channel_auth_timeout: Duration,
    /// Period of the typing keep-alive while an LLM call is in flight.
    pub typing_period: Duration,

    /// Multiplicative score boost for the chat's preferred account.
    pub preferred_account_boost: f64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            default_api_url: "https://demo.finwave.app/api/".to_string(),
            allow_custom_url: true,
            llm_enabled: false,
            llm_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_llm_runs: 5,
            context_capacity: 20,
            refresh_window: Duration::from_secs(30 * 60),
            channel_auth_timeout: Duration::from_secs(5),
            typing_period: Duration::from_secs(2),
            preferred_account_boost: 1.2,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("BACKEND_API_URL") {
            config.default_api_url = url;
        }
        if let Ok(flag) = env::var("ALLOW_CUSTOM_URL") {
            config.allow_custom_url = flag != "0" && !flag.eq_ignore_ascii_case("false");
        }
        if let Ok(key) = env::var("LLM_API_KEY") {
            config.llm_enabled = !key.is_empty();
            config.llm_api_key = key;
        }
        if let Ok(url) = env::var("LLM_API_URL") {
            config.llm_api_url = url;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm_model = model;
        }
        if let Ok(prompt) = env::var("LLM_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }
        if let Some(runs) = parse_env("LLM_MAX_RUNS") {
            config.max_llm_runs = runs;
        }
        if let Some(capacity) = parse_env("CONTEXT_CAPACITY") {
            config.context_capacity = capacity;
        }
        if let Some(secs) = parse_env("REFRESH_WINDOW_SECS") {
            config.refresh_window = Duration::from_secs(secs);
        }
        if let Some(boost) = parse_env("PREFERRED_ACCOUNT_BOOST") {
            config.preferred_account_boost = boost;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = AssistantConfig::default();
        assert_eq!(config.max_llm_runs, 5);
        assert_eq!(config.context_capacity, 20);
        assert_eq!(config.refresh_window, Duration::from_secs(1800));
        assert_eq!(config.channel_auth_timeout, Duration::from_secs(5));
        assert!((config.preferred_account_boost - 1.2).abs() < f64::EPSILON);
    }
}
