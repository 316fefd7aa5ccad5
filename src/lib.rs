/*!
 * # subtran - batch subtitle translation engine
 *
 * A Rust library for batch translation of subtitle files using local or
 * hosted translation backends.
 *
 * ## Features
 *
 * - Parse and emit SRT and ASS subtitles, preserving timing and tags
 * - Classify lines (dialogue, sound effects, music, technical tags) so
 *   only real dialogue reaches a backend
 * - Translate through one of several backends:
 *   - Local LLM server (Ollama-compatible)
 *   - Chat-style cloud LLM APIs
 *   - DeepL, Google Translate, LibreTranslate
 * - Two-tier context-aware translation cache (memory LRU + SQLite)
 * - Per-series persistent glossary with automatic term learning
 * - Prompt assembly under a token budget with glossary, metadata,
 *   rolling context and few-shot examples
 * - Per-line semantic validation with a self-consistency retry
 * - Batch and micro-batch request modes with line-by-line fallback
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle`: SRT/ASS codec
 * - `classifier`: Line classification ahead of translation
 * - `cache`: Two-tier translation cache
 * - `glossary`: Per-series glossary store
 * - `prompts` / `fewshot`: Prompt assembly
 * - `validator`: Translation quality checks
 * - `backends`: Clients for the translation services
 * - `job`: Per-file translation state
 * - `pipeline`: Orchestrator, scheduler and response cleaner
 * - `cancellation`: Process-wide cancellation and pause
 * - `sources` / `progress`: Collaborator contracts
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Public modules
pub mod app_config;
pub mod backends;
pub mod cache;
pub mod cancellation;
pub mod classifier;
pub mod errors;
pub mod fewshot;
pub mod file_utils;
pub mod glossary;
pub mod job;
pub mod language_utils;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sources;
pub mod subtitle;
pub mod validator;

// Re-export main types for easier usage
pub use app_config::{BackendKind, Config};
pub use cache::TranslationCache;
pub use cancellation::CancellationToken;
pub use classifier::{ClassifiedLine, LineClass, LineClassifier};
pub use glossary::GlossaryStore;
pub use job::{SeriesMetadata, TranslationJob};
pub use pipeline::{FileOutcome, Orchestrator, Scheduler};
pub use prompts::{PromptBuilder, TranslationProfile};
pub use subtitle::{SubtitleDocument, SubtitleEntry, SubtitleFormat};
pub use validator::Validator;
