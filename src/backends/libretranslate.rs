/*!
 * LibreTranslate backend. Works keyless against self-hosted servers; the
 * API key is sent only when configured.
 */

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{TranslationBackend, classify_request_error, classify_status, with_backoff};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::language_utils::base_code;
use crate::prompts::{Prompt, PromptPayload};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// LibreTranslate client
pub struct LibreTranslateClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl LibreTranslateClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            client,
        }
    }

    async fn call(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/translate", self.base_url);
        let request = TranslateRequest {
            q: text,
            source: if source_lang == "auto" { "auto".to_string() } else { base_code(source_lang) },
            target: base_code(target_lang),
            api_key: (!self.api_key.is_empty()).then_some(self.api_key.as_str()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol { status_code: 0, message: e.to_string() })?;

        Ok(parsed.translated_text)
    }
}

#[async_trait]
impl TranslationBackend for LibreTranslateClient {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Libretranslate
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let PromptPayload::Plain { text } = &prompt.payload else {
            return Err(BackendError::Protocol {
                status_code: 0,
                message: "LibreTranslate backend requires a plain-text prompt".to_string(),
            });
        };

        with_backoff(3, || self.call(text, &prompt.source_lang, &prompt.target_lang)).await
    }
}
