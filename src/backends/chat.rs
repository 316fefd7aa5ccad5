/*!
 * Chat-style cloud LLM backend.
 *
 * Speaks the common chat-completions shape: a system and a user message,
 * the profile temperature, no streaming. Transient failures (429/5xx) are
 * retried with backoff; quota exhaustion surfaces as `QuotaExceeded` so
 * the scheduler can bench the backend for the rest of the run.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{TranslationBackend, classify_request_error, classify_status, with_backoff};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::prompts::{Prompt, PromptPayload};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for a hosted chat-completions API
pub struct CloudLlmClient {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl CloudLlmClient {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: user.to_string() },
            ],
            temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_request_error(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol { status_code: 0, message: e.to_string() })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(BackendError::Protocol {
                status_code: 0,
                message: "empty chat completion".to_string(),
            });
        }

        debug!("Chat completion ok ({} chars)", content.len());
        Ok(content)
    }
}

#[async_trait]
impl TranslationBackend for CloudLlmClient {
    fn name(&self) -> &'static str {
        "cloud_llm"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CloudLlm
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let PromptPayload::Llm { system, user, options } = &prompt.payload else {
            return Err(BackendError::Protocol {
                status_code: 0,
                message: "cloud LLM backend requires an LLM-shaped prompt".to_string(),
            });
        };

        with_backoff(3, || self.chat(system, user, options.temperature)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chatRequest_wireShape() {
        let request = ChatRequest {
            model: "some-model",
            messages: vec![
                ChatMessage { role: "system".to_string(), content: "rules".to_string() },
                ChatMessage { role: "user".to_string(), content: "text".to_string() },
            ],
            temperature: 0.3,
            stream: false,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["role"], "user");
        assert_eq!(wire["stream"], false);
    }

    #[test]
    fn test_chatResponse_parsesContent() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Olá"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Olá");
    }
}
