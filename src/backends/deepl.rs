/*!
 * DeepL machine translation backend.
 *
 * Calls the v2 translate endpoint with the prompt's glossary entries when
 * present. DeepL has no system prompt, so context arrives as an inline
 * `[Context: ...]` prefix assembled by the prompt builder.
 */

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{TranslationBackend, classify_request_error, classify_status, with_backoff};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::prompts::{GlossaryEntry, Prompt, PromptPayload};

const API_URL: &str = "https://api-free.deepl.com/v2/translate";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: Vec<&'a str>,
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    glossary: Vec<WireGlossaryEntry>,
}

#[derive(Debug, Serialize)]
struct WireGlossaryEntry {
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// DeepL API client
pub struct DeeplClient {
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl DeeplClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        Self { api_key: api_key.to_string(), timeout, client }
    }

    /// DeepL wants upper-case locale codes ("PT-BR")
    fn wire_lang(code: &str) -> String {
        code.to_uppercase()
    }

    async fn call(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        glossary_entries: &[GlossaryEntry],
    ) -> Result<String, BackendError> {
        let request = TranslateRequest {
            text: vec![text],
            target_lang: Self::wire_lang(target_lang),
            source_lang: (source_lang != "auto").then(|| Self::wire_lang(source_lang)),
            glossary: glossary_entries
                .iter()
                .map(|entry| WireGlossaryEntry {
                    source: entry.source.clone(),
                    target: entry.target.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 456 is DeepL's "quota exceeded"
            if status.as_u16() == 456 {
                return Err(BackendError::QuotaExceeded(body));
            }
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol { status_code: 0, message: e.to_string() })?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| BackendError::Protocol {
                status_code: 0,
                message: "empty translations array".to_string(),
            })
    }
}

#[async_trait]
impl TranslationBackend for DeeplClient {
    fn name(&self) -> &'static str {
        "deepl"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Deepl
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let PromptPayload::Deepl { text, glossary_entries } = &prompt.payload else {
            return Err(BackendError::Protocol {
                status_code: 0,
                message: "DeepL backend requires a DeepL-shaped prompt".to_string(),
            });
        };

        with_backoff(3, || {
            self.call(text, &prompt.source_lang, &prompt.target_lang, glossary_entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wireLang_shouldUppercase() {
        assert_eq!(DeeplClient::wire_lang("pt-BR"), "PT-BR");
        assert_eq!(DeeplClient::wire_lang("en"), "EN");
    }

    #[test]
    fn test_translateRequest_omitsAutoSourceAndEmptyGlossary() {
        let request = TranslateRequest {
            text: vec!["Hello"],
            target_lang: "PT-BR".to_string(),
            source_lang: None,
            glossary: Vec::new(),
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("source_lang").is_none());
        assert!(wire.get("glossary").is_none());
        assert_eq!(wire["text"][0], "Hello");
    }
}
