/*!
 * Local LLM server client (Ollama-compatible generate API).
 *
 * Handles model availability (listing installed models, auto-downloading
 * the configured one with throttled progress logging and a per-process
 * pull guard), a once-per-process warmup request, and single/batch
 * generation with the profile's decoding options.
 */

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{TranslationBackend, classify_status, parse_numbered_response, repair_mojibake};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::prompts::{GenerationOptions, Prompt, PromptPayload};

/// Short connect timeout; the server is local or on the LAN
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Generation can be slow on a cold model or busy GPU
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
/// Model downloads run for a long time
const PULL_TIMEOUT: Duration = Duration::from_secs(3600);
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);
const WARMUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Installed-models cache TTL
const MODELS_CACHE_TTL: Duration = Duration::from_secs(30);

/// Generate request payload
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    keep_alive: &'a str,
    options: OllamaOptions,
}

/// Decoding options in the server's wire shape
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    num_predict: u32,
    num_ctx: u32,
    num_batch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_thread: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl From<&GenerationOptions> for OllamaOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            top_p: options.top_p,
            repeat_penalty: options.repeat_penalty,
            num_predict: options.num_predict,
            num_ctx: options.num_ctx,
            num_batch: 512,
            num_thread: (options.num_thread > 0).then_some(options.num_thread),
            stop: options.stop.clone(),
        }
    }
}

/// Generate response; only the fields the engine consumes
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// One progress line of a streaming pull
#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: String,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
}

/// Client for an Ollama-compatible local LLM server
pub struct LocalLlmClient {
    base_url: String,
    model: String,
    client: Client,
    /// Installed models with a short TTL to avoid hammering /api/tags
    models_cache: Mutex<Option<(Instant, Vec<String>)>>,
    /// Pulls currently in flight, to log duplicates instead of re-pulling
    pulls_inflight: Mutex<HashSet<String>>,
    /// Serializes model downloads across tasks
    pull_lock: tokio::sync::Mutex<()>,
    /// One warmup per process
    warmed: tokio::sync::OnceCell<()>,
}

impl LocalLlmClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // The server speaks HTTP/1.1
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            models_cache: Mutex::new(None),
            pulls_inflight: Mutex::new(HashSet::new()),
            pull_lock: tokio::sync::Mutex::new(()),
            warmed: tokio::sync::OnceCell::new(),
        }
    }

    /// Installed model names, cached for a short TTL
    async fn installed_models(&self) -> Result<Vec<String>, BackendError> {
        if let Some((at, ref models)) = *self.models_cache.lock() {
            if at.elapsed() < MODELS_CACHE_TTL {
                return Ok(models.clone());
            }
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol { status_code: 0, message: e.to_string() })?;

        let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        *self.models_cache.lock() = Some((Instant::now(), models.clone()));
        Ok(models)
    }

    fn invalidate_models_cache(&self) {
        *self.models_cache.lock() = None;
    }

    fn model_installed(&self, models: &[String]) -> bool {
        models.iter().any(|name| name.contains(&self.model))
    }

    /// Stream a model download, logging progress only when the status or
    /// digest changes or the percentage advances by at least 5 points, at
    /// most once per second.
    async fn pull_model(&self) -> Result<(), BackendError> {
        let url = format!("{}/api/pull", self.base_url);

        let mut response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": self.model }))
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(|e| super::classify_request_error(e, PULL_TIMEOUT))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mut buffer = bytes::BytesMut::new();
        let mut last_log = Instant::now() - Duration::from_secs(2);
        let mut last_status = String::new();
        let mut last_digest = String::new();
        let mut last_pct: Option<u64> = None;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| super::classify_request_error(e, PULL_TIMEOUT))?
        {
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line = buffer.split_to(newline + 1);
                let Ok(progress) = serde_json::from_slice::<PullProgress>(&line) else { continue };

                let pct = match (progress.total, progress.completed) {
                    (Some(total), Some(completed)) if total > 0 => {
                        Some(completed * 100 / total)
                    }
                    _ => None,
                };

                let mut should_log = false;
                if !progress.status.is_empty() && progress.status != last_status {
                    should_log = true;
                }
                if let Some(ref digest) = progress.digest {
                    if *digest != last_digest {
                        should_log = true;
                    }
                }
                if let Some(pct) = pct {
                    if last_pct.is_none_or(|prev| pct >= prev + 5 || pct == 100) {
                        should_log = true;
                    }
                }

                if should_log && last_log.elapsed() >= Duration::from_secs(1) {
                    match pct {
                        Some(pct) => info!("Downloading {}: {} ({}%)", self.model, progress.status, pct),
                        None => info!("Downloading {}: {}", self.model, progress.status),
                    }
                    last_log = Instant::now();
                    if !progress.status.is_empty() {
                        last_status = progress.status;
                    }
                    if let Some(digest) = progress.digest {
                        last_digest = digest;
                    }
                    if pct.is_some() {
                        last_pct = pct;
                    }
                }
            }
        }

        info!("Model download finished: {}", self.model);
        Ok(())
    }

    /// POST /api/generate with one retry on read timeout
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: user,
            system: (!system.is_empty()).then_some(system),
            stream: false,
            keep_alive: "30m",
            options: OllamaOptions::from(options),
        };

        let mut last_error = BackendError::Timeout(timeout);
        for attempt in 0..2 {
            let result = self
                .client
                .post(&url)
                .json(&request)
                .timeout(timeout)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let classified = super::classify_request_error(e, timeout);
                    if matches!(classified, BackendError::Timeout(_)) && attempt == 0 {
                        warn!("Generate timed out after {:?}, retrying once", timeout);
                        last_error = classified;
                        continue;
                    }
                    return Err(classified);
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if status.as_u16() == 404 && body.to_lowercase().contains("model") {
                    return Err(BackendError::ModelMissing(self.model.clone()));
                }
                return Err(classify_status(status.as_u16(), &body));
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| BackendError::Protocol { status_code: 0, message: e.to_string() })?;

            let text = repair_mojibake(parsed.response.trim());
            if text.is_empty() {
                return Err(BackendError::Protocol {
                    status_code: 0,
                    message: "empty generation response".to_string(),
                });
            }
            return Ok(text);
        }

        Err(last_error)
    }

    fn llm_payload<'a>(prompt: &'a Prompt) -> Result<(&'a str, &'a str, &'a GenerationOptions), BackendError> {
        match &prompt.payload {
            PromptPayload::Llm { system, user, options } => Ok((system, user, options)),
            _ => Err(BackendError::Protocol {
                status_code: 0,
                message: "local LLM backend requires an LLM-shaped prompt".to_string(),
            }),
        }
    }
}

#[async_trait]
impl TranslationBackend for LocalLlmClient {
    fn name(&self) -> &'static str {
        "local_llm"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalLlm
    }

    /// Check the server is reachable and the model installed, downloading
    /// it once if missing. Concurrent calls for the same model collapse
    /// into one pull.
    async fn ensure_ready(&self) -> Result<(), BackendError> {
        let models = self.installed_models().await?;
        if self.model_installed(&models) {
            return Ok(());
        }

        {
            let inflight = self.pulls_inflight.lock();
            if inflight.contains(&self.model) {
                info!("Model {} download already in progress", self.model);
            }
        }

        let _pull_guard = self.pull_lock.lock().await;

        // Another task may have finished the pull while we waited
        self.invalidate_models_cache();
        let models = self.installed_models().await?;
        if self.model_installed(&models) {
            return Ok(());
        }

        warn!("Model {} not installed, starting automatic download", self.model);
        self.pulls_inflight.lock().insert(self.model.clone());
        let result = self.pull_model().await;
        self.pulls_inflight.lock().remove(&self.model);
        self.invalidate_models_cache();

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    "Automatic download of {} failed ({}). Install it manually on the server and re-run.",
                    self.model, e
                );
                Err(BackendError::ModelMissing(self.model.clone()))
            }
        }
    }

    /// One minimal request to page the model into memory, once per process
    async fn warmup(&self) -> Result<(), BackendError> {
        self.warmed
            .get_or_init(|| async {
                let options = GenerationOptions {
                    temperature: 0.0,
                    top_p: 1.0,
                    repeat_penalty: 1.0,
                    num_predict: 8,
                    num_ctx: 512,
                    num_thread: 0,
                    stop: Vec::new(),
                };
                match self
                    .generate("", "Translate to Portuguese: Hi", &options, WARMUP_TIMEOUT)
                    .await
                {
                    Ok(_) => debug!("Warmup OK"),
                    Err(e) => warn!("Warmup failed ({}); first translation may be slow", e),
                }
            })
            .await;
        Ok(())
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let (system, user, options) = Self::llm_payload(prompt)?;
        self.generate(system, user, options, GENERATE_TIMEOUT).await
    }

    async fn translate_batch(
        &self,
        prompt: &Prompt,
        expected: usize,
    ) -> Result<Option<Vec<Option<String>>>, BackendError> {
        let (system, user, options) = Self::llm_payload(prompt)?;
        let response = self.generate(system, user, options, GENERATE_TIMEOUT).await?;
        Ok(parse_numbered_response(&response, expected))
    }
}
