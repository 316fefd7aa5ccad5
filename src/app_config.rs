use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use log::info;

/// Application configuration module
/// This module handles the engine configuration including loading,
/// validating and saving configuration settings.
/// Represents the engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO code or "auto")
    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    /// Target language code for translation (ISO locale code)
    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    /// Maximum number of files translated in parallel (clamped to 1..=2)
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Skip files whose translated output already exists
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Translation tuning parameters
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Cache and glossary storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation backend kind
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local LLM server (Ollama-compatible generate API)
    #[default]
    LocalLlm,
    /// Cloud chat-style LLM API
    CloudLlm,
    /// DeepL machine translation
    Deepl,
    /// Google machine translation
    Google,
    /// LibreTranslate server
    Libretranslate,
}

impl BackendKind {
    /// Returns the display name of the backend
    pub fn display_name(&self) -> &str {
        match self {
            Self::LocalLlm => "local LLM",
            Self::CloudLlm => "cloud LLM",
            Self::Deepl => "DeepL",
            Self::Google => "Google",
            Self::Libretranslate => "LibreTranslate",
        }
    }

    /// Whether this backend is an LLM that accepts a system prompt
    pub fn is_llm(&self) -> bool {
        matches!(self, Self::LocalLlm | Self::CloudLlm)
    }

    /// Whether this backend bills per token and should get lean prompts
    pub fn is_paid_llm(&self) -> bool {
        matches!(self, Self::CloudLlm)
    }
}

/// Backend identity and credentials
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    /// Which backend to use
    #[serde(default)]
    pub kind: BackendKind,

    /// Service endpoint URL (local LLM, cloud LLM, LibreTranslate)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name for LLM backends
    #[serde(default = "default_model")]
    pub model: String,

    /// API key for the selected backend, where required
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds for MT backends
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Translation tuning parameters shared by the prompt builder and backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling parameter
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repetition penalty for local models
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Maximum tokens generated per line
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    /// Rolling context window size in lines (0..=10)
    #[serde(default = "default_context_window_size")]
    pub context_window_size: usize,

    /// Token budget for prompt assembly
    #[serde(default = "default_max_tokens_budget")]
    pub max_tokens_budget: usize,

    /// SRT batch size: 0 = line-by-line, else 4/6/8/10/12
    #[serde(default)]
    pub srt_batch_size: usize,

    /// ASS batch size: 1 = line-by-line, 2 = micro-batch pair, else 4/6/8/10/12
    #[serde(default = "default_ass_batch_size")]
    pub ass_batch_size: usize,

    /// Backend context window in tokens
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    /// Backend thread count, 0 = backend default
    #[serde(default)]
    pub num_thread: u32,

    /// Include rolling context in prompts
    #[serde(default = "default_true")]
    pub enable_contextual_prompt: bool,

    /// Include genre-matched few-shot examples (EN -> pt-BR only)
    #[serde(default = "default_true")]
    pub enable_fewshot: bool,

    /// Learn glossary terms from translations automatically
    #[serde(default = "default_true")]
    pub enable_auto_glossary: bool,

    /// Translate multiple lines per request when the backend supports it
    #[serde(default)]
    pub enable_batch_mode: bool,

    /// Prune long explanation-like responses down to one short sentence
    #[serde(default)]
    pub enable_explanation_pruning: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            num_predict: default_num_predict(),
            context_window_size: default_context_window_size(),
            max_tokens_budget: default_max_tokens_budget(),
            srt_batch_size: 0,
            ass_batch_size: default_ass_batch_size(),
            num_ctx: default_num_ctx(),
            num_thread: 0,
            enable_contextual_prompt: true,
            enable_fewshot: true,
            enable_auto_glossary: true,
            enable_batch_mode: false,
            enable_explanation_pruning: false,
        }
    }
}

/// Cache and glossary storage locations
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Path to the SQLite cache file; default lives under the user data dir
    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    /// Directory holding per-series glossary documents
    #[serde(default)]
    pub glossary_dir: Option<PathBuf>,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Allowed SRT batch sizes (0 = line-by-line)
pub const SRT_BATCH_SIZES: [usize; 6] = [0, 4, 6, 8, 10, 12];

/// Allowed ASS batch sizes (1 = line-by-line, 2 = micro-batch pair)
pub const ASS_BATCH_SIZES: [usize; 7] = [1, 2, 4, 6, 8, 10, 12];

fn default_source_lang() -> String {
    "auto".to_string()
}

fn default_target_lang() -> String {
    "pt-BR".to_string()
}

fn default_max_parallelism() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.85
}

fn default_repeat_penalty() -> f32 {
    1.15
}

fn default_num_predict() -> u32 {
    80
}

fn default_context_window_size() -> usize {
    5
}

fn default_max_tokens_budget() -> usize {
    2048
}

fn default_ass_batch_size() -> usize {
    2
}

fn default_num_ctx() -> u32 {
    2048
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open config file: {:?}", path.as_ref()))?;

        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;

        // Don't log the entire config - it may contain API keys
        info!("Config loaded from {:?}", path.as_ref());

        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.target_lang.trim().is_empty() {
            return Err(anyhow::anyhow!("Target language must not be empty"));
        }
        if self.source_lang.trim().is_empty() {
            return Err(anyhow::anyhow!("Source language must not be empty (use \"auto\")"));
        }

        if !(1..=2).contains(&self.max_parallelism) {
            return Err(anyhow::anyhow!(
                "max_parallelism must be 1 or 2, got {}",
                self.max_parallelism
            ));
        }

        if !SRT_BATCH_SIZES.contains(&self.translation.srt_batch_size) {
            return Err(anyhow::anyhow!(
                "srt_batch_size must be one of {:?}, got {}",
                SRT_BATCH_SIZES,
                self.translation.srt_batch_size
            ));
        }
        if !ASS_BATCH_SIZES.contains(&self.translation.ass_batch_size) {
            return Err(anyhow::anyhow!(
                "ass_batch_size must be one of {:?}, got {}",
                ASS_BATCH_SIZES,
                self.translation.ass_batch_size
            ));
        }
        if self.translation.context_window_size > 10 {
            return Err(anyhow::anyhow!(
                "context_window_size must be 0..=10, got {}",
                self.translation.context_window_size
            ));
        }

        // API key required for every hosted backend
        match self.backend.kind {
            BackendKind::CloudLlm | BackendKind::Deepl | BackendKind::Google
                if self.backend.api_key.is_empty() =>
            {
                return Err(anyhow::anyhow!(
                    "An API key is required for the {} backend",
                    self.backend.kind.display_name()
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// Create a new configuration with default values
    pub fn default_config() -> Self {
        Config {
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            max_parallelism: default_max_parallelism(),
            skip_existing: true,
            backend: BackendConfig::default(),
            translation: TranslationConfig::default(),
            storage: StorageConfig::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Config saved");

        Ok(())
    }

    /// Resolve the cache file path, falling back to the user data directory
    pub fn cache_file_path(&self) -> PathBuf {
        if let Some(ref path) = self.storage.cache_file {
            return path.clone();
        }
        default_data_dir().join("translation_cache.db")
    }

    /// Resolve the glossary directory, falling back to the user data directory
    pub fn glossary_dir_path(&self) -> PathBuf {
        if let Some(ref dir) = self.storage.glossary_dir {
            return dir.clone();
        }
        default_data_dir().join("glossaries")
    }
}

/// Base data directory for cache and glossaries
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subtran")
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = Config::default_config();
    config.save_to_file(&path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();

        assert_eq!(config.source_lang, "auto");
        assert_eq!(config.target_lang, "pt-BR");
        assert_eq!(config.max_parallelism, 1);
        assert!(config.skip_existing);
        assert_eq!(config.backend.kind, BackendKind::LocalLlm);
        assert_eq!(config.translation.srt_batch_size, 0);
        assert_eq!(config.translation.ass_batch_size, 2);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_batch_sizes() {
        let mut config = Config::default_config();

        config.translation.srt_batch_size = 5;
        assert!(config.validate().is_err());
        config.translation.srt_batch_size = 8;
        assert!(config.validate().is_ok());

        config.translation.ass_batch_size = 3;
        assert!(config.validate().is_err());
        config.translation.ass_batch_size = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_parallelism() {
        let mut config = Config::default_config();

        config.max_parallelism = 0;
        assert!(config.validate().is_err());
        config.max_parallelism = 3;
        assert!(config.validate().is_err());
        config.max_parallelism = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_api_keys() {
        let mut config = Config::default_config();

        // Local LLM needs no key
        assert!(config.validate().is_ok());

        // Hosted backends do
        config.backend.kind = BackendKind::Deepl;
        assert!(config.validate().is_err());
        config.backend.api_key = "key-1234".to_string();
        assert!(config.validate().is_ok());

        // LibreTranslate can run keyless against a self-hosted server
        config.backend.kind = BackendKind::Libretranslate;
        config.backend.api_key = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.json");

        let mut config = Config::default_config();
        config.translation.enable_batch_mode = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.target_lang, "pt-BR");
        assert!(loaded.translation.enable_batch_mode);
    }
}
