/*!
 * Google Cloud Translation backend (v2 REST API).
 */

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{TranslationBackend, classify_request_error, classify_status, with_backoff};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::language_utils::base_code;
use crate::prompts::{Prompt, PromptPayload};

const API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Google Translate v2 client
pub struct GoogleClient {
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl GoogleClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        Self { api_key: api_key.to_string(), timeout, client }
    }

    async fn call(&self, text: &str, target_lang: &str) -> Result<String, BackendError> {
        // The v2 API takes bare language codes ("pt", not "pt-BR")
        let body = serde_json::json!({
            "q": text,
            "target": base_code(target_lang),
            "format": "text",
        });

        let response = self
            .client
            .post(API_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
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

        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| BackendError::Protocol {
                status_code: 0,
                message: "empty translations array".to_string(),
            })
    }
}

#[async_trait]
impl TranslationBackend for GoogleClient {
    fn name(&self) -> &'static str {
        "google"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let PromptPayload::Plain { text } = &prompt.payload else {
            return Err(BackendError::Protocol {
                status_code: 0,
                message: "Google backend requires a plain-text prompt".to_string(),
            });
        };

        with_backoff(3, || self.call(text, &prompt.target_lang)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translateResponse_parsesNestedShape() {
        let body = r#"{"data":{"translations":[{"translatedText":"Olá mundo"}]}}"#;
        let parsed: TranslateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.translations[0].translated_text, "Olá mundo");
    }
}
