//! Chat-completion client
//!
//! OpenAI-style request/response over a long-lived pooled reqwest client.
//! `LlmClient` is a trait seam so tests can script replies.

use crate::error::AssistantError;
use crate::llm::context::TurnRole;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion call: system prompt + ordered turns -> reply text.
    async fn complete(&self, system_prompt: &str, turns: &[(TurnRole, String)])
        -> Result<String>;
}

/// Reusable chat-completion client (connection-pooled).
pub struct OpenAiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[(TurnRole, String)],
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Llm("LLM API key not configured".to_string()));
        }

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt.to_string(),
        });

        for (role, text) in turns {
            messages.push(ChatMessage {
                role: match role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                content: text.clone(),
            });
        }

        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        info!(model = %self.model, turn_count = turns.len(), "Calling LLM service");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("LLM request failed: {}", e);
                AssistantError::Llm(format!("LLM request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("LLM error response: {}", error_text);
            return Err(AssistantError::Llm(format!("LLM service error: {}", error_text)));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse LLM response: {}", e);
            AssistantError::Llm(format!("LLM parse error: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistantError::Llm("Empty response from LLM".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Scripted client for tests: returns queued replies in order, repeating the
/// last one when the script runs out.
pub struct ScriptedLlm {
    replies: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<usize>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        turns: &[(TurnRole, String)],
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(turns.len());
        }

        let mut replies = self
            .replies
            .lock()
            .map_err(|_| AssistantError::Llm("script lock poisoned".to_string()))?;

        if replies.len() > 1 {
            Ok(replies.remove(0))
        } else {
            replies
                .first()
                .cloned()
                .ok_or_else(|| AssistantError::Llm("script exhausted".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a finance assistant".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: "How much did I spend on coffee?".to_string(),
                },
            ],
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("coffee"));
    }

    #[tokio::test]
    async fn test_scripted_llm_replays_in_order() {
        let llm = ScriptedLlm::new(vec!["first", "second"]);

        let a = llm.complete("", &[]).await.unwrap();
        let b = llm.complete("", &[]).await.unwrap();
        let c = llm.complete("", &[]).await.unwrap();

        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(c, "second"); // last reply repeats
        assert_eq!(llm.call_count(), 3);
    }
}
