/*!
 * Backend implementations for the translation services.
 *
 * Every backend implements the `TranslationBackend` trait, a uniform
 * facade over heterogeneous protocols:
 * - `local_llm`: Ollama-compatible local LLM server
 * - `cloud_llm`: chat-style hosted LLM API
 * - `deepl`, `google`, `libretranslate`: machine translation services
 */

pub mod ollama;
pub mod chat;
pub mod deepl;
pub mod google;
pub mod libretranslate;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::app_config::{BackendKind, Config};
use crate::errors::BackendError;
use crate::prompts::Prompt;

/// Batch lines come back as `N│ text`, but models drift into `N. text`,
/// `N) text`, `N: text` and `N - text`; all are accepted.
static NUMBERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[\u{2502}.):\-\u{2013}\u{2014}]?\s+(.+)$").unwrap());

/// Uniform facade over the translation backends
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Short identifier used in cache rows and logs
    fn name(&self) -> &'static str;

    /// Which kind of backend this is
    fn kind(&self) -> BackendKind;

    /// Verify the backend can serve requests (connectivity, model
    /// availability). Called once before a run; may download a model.
    async fn ensure_ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Minimal request to load the model into memory. Called once per
    /// process before parallel work begins.
    async fn warmup(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Translate one prompt into the target text
    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError>;

    /// Translate a numbered batch prompt. `Ok(None)` means the batch could
    /// not be parsed confidently and the caller must fall back to
    /// line-by-line; inner `None` slots mark individual missing lines.
    async fn translate_batch(
        &self,
        _prompt: &Prompt,
        _expected: usize,
    ) -> Result<Option<Vec<Option<String>>>, BackendError> {
        Ok(None)
    }
}

/// Build the configured backend
pub fn create_backend(config: &Config) -> Result<Arc<dyn TranslationBackend>, BackendError> {
    let backend = &config.backend;
    let timeout = Duration::from_secs(backend.timeout_secs);

    // Endpoint-based backends need a well-formed base URL up front
    if matches!(
        backend.kind,
        BackendKind::LocalLlm | BackendKind::CloudLlm | BackendKind::Libretranslate
    ) {
        url::Url::parse(&backend.base_url).map_err(|e| {
            BackendError::Unavailable(format!("invalid base_url {:?}: {}", backend.base_url, e))
        })?;
    }

    let built: Arc<dyn TranslationBackend> = match backend.kind {
        BackendKind::LocalLlm => {
            Arc::new(ollama::LocalLlmClient::new(&backend.base_url, &backend.model))
        }
        BackendKind::CloudLlm => Arc::new(chat::CloudLlmClient::new(
            &backend.base_url,
            &backend.model,
            &backend.api_key,
        )),
        BackendKind::Deepl => Arc::new(deepl::DeeplClient::new(&backend.api_key, timeout)),
        BackendKind::Google => Arc::new(google::GoogleClient::new(&backend.api_key, timeout)),
        BackendKind::Libretranslate => Arc::new(libretranslate::LibreTranslateClient::new(
            &backend.base_url,
            &backend.api_key,
            timeout,
        )),
    };

    Ok(built)
}

/// Parse a numbered batch response into per-slot translations.
///
/// Returns `None` when fewer than 60% of the expected lines parse, or when
/// more than 30% of the slots end up missing; the caller then falls back
/// to line-by-line requests. Otherwise missing slots are `None`.
pub fn parse_numbered_response(text: &str, expected: usize) -> Option<Vec<Option<String>>> {
    if expected == 0 {
        return Some(Vec::new());
    }

    let mut parsed: std::collections::HashMap<usize, String> = std::collections::HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = NUMBERED_LINE.captures(line) else { continue };
        let Ok(num) = caps[1].parse::<usize>() else { continue };
        if num == 0 || num > expected {
            continue;
        }

        let mut translation = caps[2].trim().to_string();
        for quote in ['"', '\''] {
            if translation.len() >= 2
                && translation.starts_with(quote)
                && translation.ends_with(quote)
            {
                translation = translation[1..translation.len() - 1].to_string();
            }
        }

        if !translation.trim_matches(['.', ',', ' ']).is_empty() {
            parsed.entry(num).or_insert(translation);
        }
    }

    if (parsed.len() as f64) < expected as f64 * 0.6 {
        return None;
    }

    let result: Vec<Option<String>> = (1..=expected).map(|i| parsed.remove(&i)).collect();
    let missing = result.iter().filter(|slot| slot.is_none()).count();
    if (missing as f64) > expected as f64 * 0.3 {
        return None;
    }

    Some(result)
}

/// Retry an operation on transient failures with exponential backoff and
/// jitter: base 1 s, doubling, capped at 10 s per wait.
pub async fn with_backoff<T, F, Fut>(max_retries: u32, mut operation: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let base_ms = 1000u64.saturating_mul(1 << attempt).min(10_000);
                let jitter = rand::rng().random_range(0..250);
                tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a reqwest failure onto the backend error taxonomy
pub(crate) fn classify_request_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout)
    } else if e.is_connect() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Protocol { status_code: 0, message: e.to_string() }
    }
}

/// Map a non-success HTTP status and body onto the taxonomy
pub(crate) fn classify_status(status: u16, body: &str) -> BackendError {
    if BackendError::looks_like_quota(body) {
        return BackendError::QuotaExceeded(truncate_body(body));
    }
    BackendError::Protocol { status_code: status, message: truncate_body(body) }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        trimmed.chars().take(200).collect()
    } else {
        trimmed.to_string()
    }
}

/// Repair the classic latin1-as-utf8 mojibake some local models emit
pub(crate) fn repair_mojibake(text: &str) -> String {
    if !text.contains('\u{251c}') && !text.contains('\u{252c}') && !text.contains('â') {
        return text.to_string();
    }

    let bytes: Option<Vec<u8>> = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF { Some(code as u8) } else { None }
        })
        .collect();

    match bytes.and_then(|b| String::from_utf8(b).ok()) {
        Some(repaired) => repaired,
        None => text.to_string(),
    }
}
