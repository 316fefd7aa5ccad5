/*!
 * Prompt assembly for every backend.
 *
 * Prompts are built under a token budget with a strict priority order:
 * system rules, then the glossary, series metadata, rolling context and
 * few-shot examples, with the text to translate always last. Sections that
 * would blow the budget are dropped in reverse priority; the glossary and
 * the user text are never dropped.
 */

use crate::app_config::{BackendKind, TranslationConfig};
use crate::fewshot;
use crate::job::TranslationJob;
use crate::language_utils::prompt_language_name;

/// Rough token estimate: one token per four characters
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Sampling and decoding options sent to LLM backends
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
    /// 0 means backend default
    pub num_thread: u32,
    /// Sequences that cut the response before echoes leak in
    pub stop: Vec<String>,
}

/// Immutable translation parameters, built once from config
#[derive(Debug, Clone)]
pub struct TranslationProfile {
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    pub context_window_size: usize,
    pub max_tokens_budget: usize,
    pub num_ctx: u32,
    pub num_thread: u32,
    pub enable_contextual_prompt: bool,
    pub enable_fewshot: bool,
    pub enable_auto_glossary: bool,
    pub enable_batch_mode: bool,
    pub enable_explanation_pruning: bool,
}

impl Default for TranslationProfile {
    fn default() -> Self {
        Self::from_config(&TranslationConfig::default())
    }
}

impl TranslationProfile {
    /// Build a profile from the engine configuration
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
            num_predict: config.num_predict,
            context_window_size: config.context_window_size,
            max_tokens_budget: config.max_tokens_budget,
            num_ctx: config.num_ctx,
            num_thread: config.num_thread,
            enable_contextual_prompt: config.enable_contextual_prompt,
            enable_fewshot: config.enable_fewshot,
            enable_auto_glossary: config.enable_auto_glossary,
            enable_batch_mode: config.enable_batch_mode,
            enable_explanation_pruning: config.enable_explanation_pruning,
        }
    }

    /// Options for a single-line request. The prediction budget scales
    /// with input length; stop sequences suppress prompt echoes.
    pub fn generation_options(&self, text_len: usize) -> GenerationOptions {
        let mut num_predict = self.num_predict;
        if text_len > 0 {
            let scaled = (text_len * 3).min(self.max_tokens_budget) as u32;
            num_predict = num_predict.max(scaled);
        }

        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            num_predict,
            num_ctx: self.num_ctx,
            num_thread: self.num_thread,
            stop: stop_sequences(),
        }
    }

    /// Options for a numbered batch request. Newlines separate the output
    /// lines, so no stop sequences apply.
    pub fn batch_options(&self, batch_text_len: usize) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            num_predict: (batch_text_len * 3).max(200).min(self.max_tokens_budget) as u32,
            num_ctx: self.num_ctx,
            num_thread: self.num_thread,
            stop: Vec::new(),
        }
    }
}

/// Stop sequences for single-line generation
fn stop_sequences() -> Vec<String> {
    ["\n", "\\n", "Note:", "Nota:", "explain", "English:", "Previous context"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A glossary entry shipped to DeepL's native glossary parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

/// Backend-shaped prompt payload
#[derive(Debug, Clone)]
pub enum PromptPayload {
    /// LLM backends: system + user + decoding options
    Llm {
        system: String,
        user: String,
        options: GenerationOptions,
    },
    /// DeepL: raw text plus native glossary entries
    Deepl {
        text: String,
        glossary_entries: Vec<GlossaryEntry>,
    },
    /// Google / LibreTranslate: just the (possibly hinted) text
    Plain { text: String },
}

/// A fully assembled prompt, carrying the language selection
#[derive(Debug, Clone)]
pub struct Prompt {
    pub source_lang: String,
    pub target_lang: String,
    pub payload: PromptPayload,
}

const SYSTEM_PROMPT_SINGLE: &str = "You are a professional subtitle translator. MANDATORY RULES:

1. Reply with ONLY the translated line
2. NEVER add explanations, comments, 'translation:', etc.
3. Match gender and number agreement correctly
4. Use correct conditional forms
5. Natural, fluent target language
6. Keep formatting [XXX] if present
7. Preserve ellipses (...) and emotional punctuation
8. Use colloquial register when appropriate

TRANSLATE ONLY:";

const SYSTEM_PROMPT_BATCH: &str = "You are a subtitle translator. Your ONLY task is to receive N numbered lines and return EXACTLY N lines in the SAME format and order.

MANDATORY OUTPUT FORMAT (one line per number, skip none):
1\u{2502} translation of line 1
2\u{2502} translation of line 2
3\u{2502} translation of line 3
... (up to N\u{2502})

RULES:
- Return EXACTLY the same number of lines received, in the same order (1, 2, 3, ...).
- Use ONLY the format \"number\u{2502} text\" per line. No header, footer, or explanations.
- Natural target language; preserve tone, slang, and dialogue continuity.
- Keep ASS/SRT tags ({\\i1}, {\\an8}, etc.) and formatting; do not translate proper nouns, (*effects*), [notes].
- If a line is only a sound effect or name, repeat it unchanged with the same number.";

/// Assembles prompts for any backend under the profile's token budget
pub struct PromptBuilder {
    profile: TranslationProfile,
}

impl PromptBuilder {
    pub fn new(profile: TranslationProfile) -> Self {
        Self { profile }
    }

    /// The profile this builder was created with
    pub fn profile(&self) -> &TranslationProfile {
        &self.profile
    }

    /// Build a single-line prompt shaped for the backend
    pub fn build(
        &self,
        backend: BackendKind,
        text: &str,
        job: &TranslationJob,
        source_lang: &str,
        target_lang: &str,
    ) -> Prompt {
        let payload = match backend {
            BackendKind::LocalLlm => self.build_full_llm(text, job, source_lang, target_lang),
            BackendKind::CloudLlm => self.build_lean_llm(text, job, source_lang, target_lang),
            BackendKind::Deepl => self.build_deepl(text, job),
            BackendKind::Google | BackendKind::Libretranslate => self.build_plain(text, job),
        };

        Prompt {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            payload,
        }
    }

    /// Build a numbered batch prompt for the local LLM backend
    pub fn build_batch(
        &self,
        texts: &[String],
        job: &TranslationJob,
        source_lang: &str,
        target_lang: &str,
    ) -> Prompt {
        let n = texts.len();
        let target_name = prompt_language_name(target_lang);

        let numbered: Vec<String> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}\u{2502} {}", i + 1, t))
            .collect();
        let numbered_block = numbered.join("\n");

        let mut system = SYSTEM_PROMPT_BATCH.to_string();
        if let Some(glossary) = self.glossary_section(job) {
            system.push_str("\n\n");
            system.push_str(&glossary);
        }

        let mut user = String::new();
        if let Some(context) = self.batch_context_section(job) {
            user.push_str(&context);
        }

        let mut example_lines: Vec<String> =
            (1..=n.min(4)).map(|i| format!("{}\u{2502} ...", i)).collect();
        if n > 4 {
            example_lines.push("...".to_string());
            example_lines.push(format!("{}\u{2502} ...", n));
        }

        user.push_str(&format!(
            "Translate the {} lines below to {}. Reply with ONLY {} lines in the format:\n{}\n\nINPUT ({} lines):\n{}",
            n,
            target_name,
            n,
            example_lines.join("\n"),
            n,
            numbered_block
        ));

        Prompt {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            payload: PromptPayload::Llm {
                system,
                user,
                options: self.profile.batch_options(numbered_block.len()),
            },
        }
    }

    /// Full prompt for local models. The glossary and the user text are
    /// always included; metadata, context and few-shots fit as budget allows.
    fn build_full_llm(
        &self,
        text: &str,
        job: &TranslationJob,
        source_lang: &str,
        target_lang: &str,
    ) -> PromptPayload {
        let source_name = prompt_language_name(source_lang);
        let target_name = prompt_language_name(target_lang);

        let budget = self.profile.max_tokens_budget;
        let mut used = estimate_tokens(SYSTEM_PROMPT_SINGLE);

        let mut system_parts = vec![SYSTEM_PROMPT_SINGLE.to_string()];
        let mut user_parts: Vec<String> = Vec::new();

        // The glossary is never dropped; it only consumes budget so the
        // lower-priority sections below get squeezed out first
        if let Some(glossary) = self.glossary_section(job) {
            used += estimate_tokens(&glossary);
            system_parts.push(glossary);
        }

        if let Some(metadata) = self.metadata_section(job) {
            let cost = estimate_tokens(&metadata);
            if used + cost < budget {
                system_parts.push(metadata);
                used += cost;
            }
        }

        if let Some(context) = self.context_section(job) {
            let cost = estimate_tokens(&context);
            if used + cost < budget {
                user_parts.push(context);
                used += cost;
            }
        }

        if self.profile.enable_fewshot && fewshot::pair_supported(source_lang, target_lang) {
            let examples =
                fewshot::examples_for(job.metadata.detect_kind().label(), &job.metadata.genres, 4);
            let section = fewshot_section(examples);
            let cost = estimate_tokens(&section);
            if used + cost < budget {
                user_parts.insert(0, section);
            }
        }

        // The text to translate is always last and never dropped
        user_parts.push(format!(
            "TRANSLATE the line below from {src} to {tgt}.\nIMPORTANT: You MUST translate it. Do NOT return the original {src} text.\nRESPOND WITH ONLY THE TRANSLATION in {tgt}. NO explanations. NO notes.\n\n{src}: {text}\n{tgt}:",
            src = source_name,
            tgt = target_name,
            text = text
        ));

        PromptPayload::Llm {
            system: system_parts.join("\n\n"),
            user: user_parts.join("\n\n"),
            options: self.profile.generation_options(text.len()),
        }
    }

    /// Lean prompt for paid APIs: minimal system text, at most ten series
    /// terms, two context lines, no few-shots.
    fn build_lean_llm(
        &self,
        text: &str,
        job: &TranslationJob,
        source_lang: &str,
        target_lang: &str,
    ) -> PromptPayload {
        let source_name = prompt_language_name(source_lang);
        let target_name = prompt_language_name(target_lang);

        let mut system = format!(
            "Translate the subtitle line from {} to {}. Reply with ONLY the translation. Preserve formatting tags, proper nouns, and punctuation.",
            source_name, target_name
        );

        if let Some(ref glossary) = job.glossary {
            let terms: Vec<String> = glossary
                .iter()
                .take(10)
                .map(|(k, v)| format!("  {} \u{2192} {}", k, v))
                .collect();
            if !terms.is_empty() {
                system.push_str("\n\nKeep these terms untranslated:\n");
                system.push_str(&terms.join("\n"));
            }
        }

        let mut user_parts = Vec::new();
        if self.profile.enable_contextual_prompt {
            let recent = job.recent_context();
            let tail = &recent[recent.len().saturating_sub(2)..];
            if !tail.is_empty() {
                user_parts.push(format!("[Previous: {}]", tail.join(" / ")));
            }
        }
        user_parts.push(format!("{}: {}\n{}:", source_name, text, target_name));

        PromptPayload::Llm {
            system,
            user: user_parts.join("\n"),
            options: self.profile.generation_options(text.len()),
        }
    }

    /// DeepL payload: native glossary entries plus an optional inline
    /// context prefix
    fn build_deepl(&self, text: &str, job: &TranslationJob) -> PromptPayload {
        let glossary_entries: Vec<GlossaryEntry> = job
            .glossary
            .iter()
            .flat_map(|g| g.iter())
            .take(50)
            .map(|(k, v)| GlossaryEntry { source: k.clone(), target: v.clone() })
            .collect();

        let mut enriched = text.to_string();
        if self.profile.enable_contextual_prompt {
            let recent = job.recent_context();
            let tail = &recent[recent.len().saturating_sub(2)..];
            if !tail.is_empty() {
                enriched = format!("[Context: {}] {}", tail.join(" // "), text);
            }
        }

        PromptPayload::Deepl { text: enriched, glossary_entries }
    }

    /// Google / LibreTranslate payload with up to ten keep-hints
    fn build_plain(&self, text: &str, job: &TranslationJob) -> PromptPayload {
        let mut enriched = text.to_string();

        if let Some(ref glossary) = job.glossary {
            let hints: Vec<String> =
                glossary.iter().take(10).map(|(k, v)| format!("{}={}", k, v)).collect();
            if !hints.is_empty() {
                enriched = format!("[Keep: {}] {}", hints.join(", "), text);
            }
        }

        PromptPayload::Plain { text: enriched }
    }

    /// Mandatory glossary section from the job's budgeted snapshot
    fn glossary_section(&self, job: &TranslationJob) -> Option<String> {
        let glossary = job.glossary.as_ref()?;
        if glossary.is_empty() {
            return None;
        }

        let items: Vec<String> = glossary
            .iter()
            .map(|(k, v)| format!("  {} \u{2192} {}", k, v))
            .collect();

        Some(format!(
            "MANDATORY GLOSSARY \u{2014} use exactly these terms:\n{}\n\nCRITICAL RULE: Keep these terms as given, do NOT re-translate them.",
            items.join("\n")
        ))
    }

    /// Series metadata section
    fn metadata_section(&self, job: &TranslationJob) -> Option<String> {
        let meta = &job.metadata;
        if meta.title.is_empty() {
            return None;
        }

        let mut parts = vec![format!("Series: {}", meta.title)];
        if !meta.genres.is_empty() {
            parts.push(format!("Genres: {}", meta.genres.join(", ")));
        }
        if !meta.characters.is_empty() {
            let names: Vec<&str> =
                meta.characters.iter().take(10).map(|c| c.as_str()).collect();
            parts.push(format!("Characters: {}", names.join(", ")));
        }
        parts.push(format!("Kind: {}", meta.detect_kind().label()));

        Some(parts.join("\n"))
    }

    /// Rolling context section, labeled read-only
    fn context_section(&self, job: &TranslationJob) -> Option<String> {
        if !self.profile.enable_contextual_prompt {
            return None;
        }
        let recent = job.recent_context();
        if recent.is_empty() {
            return None;
        }

        let mut lines = vec!["Previous context (read only, do NOT translate):".to_string()];
        let total = recent.len();
        for (i, line) in recent.iter().enumerate() {
            lines.push(format!("  [-{}]: {}", total - i, line));
        }

        Some(lines.join("\n"))
    }

    /// Shorter context block used inside batch prompts
    fn batch_context_section(&self, job: &TranslationJob) -> Option<String> {
        let recent = job.recent_context();
        if recent.is_empty() {
            return None;
        }

        let mut section = String::from("Previous context (use for consistency, do NOT translate):\n");
        let tail = &recent[recent.len().saturating_sub(3)..];
        for (i, line) in tail.iter().enumerate() {
            section.push_str(&format!("  [{}] {}\n", i + 1, line));
        }
        section.push('\n');
        Some(section)
    }
}

/// Few-shot examples formatted for the user message
fn fewshot_section(examples: &[fewshot::FewshotExample]) -> String {
    let mut lines = vec!["Translation examples (match the style):".to_string()];
    for example in examples {
        lines.push(format!("  EN: {}", example.source));
        lines.push(format!("  PT: {}", example.target));
        lines.push(String::new());
    }
    lines.join("\n")
}
