/*!
 * Per-file translation state.
 *
 * A `TranslationJob` is created when a file starts and dropped when it
 * finishes; it is never shared across files, so concurrent jobs for
 * different series cannot leak context or glossary terms into each other.
 */

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::prompts::TranslationProfile;

/// Capitalized tokens are auto-glossary candidates
static CAPITALIZED_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z]+\b").unwrap());

/// Kind of series, used for prompt register and few-shot selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Anime,
    LiveAction,
    Documentary,
}

impl SeriesKind {
    /// Label used in prompt text
    pub fn label(&self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::LiveAction => "live_action",
            Self::Documentary => "documentary",
        }
    }
}

/// Series metadata injected into prompts. Read-only after creation.
#[derive(Debug, Clone, Default)]
pub struct SeriesMetadata {
    pub title: String,
    pub genres: Vec<String>,
    pub characters: Vec<String>,
    pub kind: Option<SeriesKind>,
}

impl SeriesMetadata {
    /// Detect the series kind from explicit metadata or genre signals
    pub fn detect_kind(&self) -> SeriesKind {
        if let Some(kind) = self.kind {
            return kind;
        }

        let genres: Vec<String> = self.genres.iter().map(|g| g.to_lowercase()).collect();

        let anime_signals = [
            "animation", "anime", "shounen", "shoujo", "seinen", "josei", "isekai", "mecha",
            "magical girl", "slice of life",
        ];
        if genres.iter().any(|g| anime_signals.contains(&g.as_str())) {
            return SeriesKind::Anime;
        }

        let doc_signals = ["documentary", "news", "reality", "talk show"];
        if genres.iter().any(|g| doc_signals.contains(&g.as_str())) {
            return SeriesKind::Documentary;
        }

        SeriesKind::LiveAction
    }
}

/// Per-job counters, reported at file end
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub total_lines: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub validation_rejections: u64,
    pub api_failures: u64,
    pub successful_translations: u64,
    pub self_consistency_triggered: u64,
    pub classified_dialogue: u64,
    pub classified_sfx: u64,
    pub classified_music: u64,
    pub classified_tag: u64,
    pub classified_untranslatable: u64,
}

impl JobStats {
    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} dialogue, {} sfx, {} music, {} tags, {} untouched | {} ok, {} cache hits, {} rejected, {} api failures, {} self-consistency",
            self.classified_dialogue,
            self.classified_sfx,
            self.classified_music,
            self.classified_tag,
            self.classified_untranslatable,
            self.successful_translations,
            self.cache_hits,
            self.validation_rejections,
            self.api_failures,
            self.self_consistency_triggered,
        )
    }
}

/// Isolated state for translating one subtitle file
#[derive(Debug)]
pub struct TranslationJob {
    /// Series metadata, read-only after creation
    pub metadata: SeriesMetadata,

    /// Budgeted glossary snapshot, read-only after creation
    pub glossary: Option<BTreeMap<String, String>>,

    /// Translation parameters for this job
    pub profile: TranslationProfile,

    /// Counter bag
    pub stats: JobStats,

    /// Rolling window of recent translated outputs, trimmed from the front
    translation_context: Vec<String>,

    /// candidate key (lowercased original token) -> observed target forms
    auto_glossary_candidates: HashMap<String, HashMap<String, u32>>,
}

impl TranslationJob {
    /// New job with the given profile; metadata and glossary attach later
    pub fn new(profile: TranslationProfile) -> Self {
        Self {
            metadata: SeriesMetadata::default(),
            glossary: None,
            profile,
            stats: JobStats::default(),
            translation_context: Vec::new(),
            auto_glossary_candidates: HashMap::new(),
        }
    }

    /// Append a translated line to the rolling context. The buffer is
    /// capped at twice the window size and trimmed from the front.
    pub fn add_context(&mut self, translated_line: &str) {
        self.translation_context.push(translated_line.to_string());

        let max = self.profile.context_window_size * 2;
        if self.translation_context.len() > max {
            let excess = self.translation_context.len() - max;
            self.translation_context.drain(..excess);
        }
    }

    /// Last N translated lines, oldest first
    pub fn recent_context(&self) -> &[String] {
        let n = self.profile.context_window_size;
        let start = self.translation_context.len().saturating_sub(n);
        &self.translation_context[start..]
    }

    /// Track capitalized tokens that survived translation verbatim; they
    /// are proper-noun candidates for the series glossary.
    pub fn track_auto_glossary(&mut self, original: &str, translated: &str) {
        if !self.profile.enable_auto_glossary {
            return;
        }

        for cap in CAPITALIZED_WORD.find_iter(original) {
            let word = cap.as_str();
            if translated.contains(word) {
                let observed = self
                    .auto_glossary_candidates
                    .entry(word.to_lowercase())
                    .or_default();
                *observed.entry(word.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Candidates seen at least `min_occurrences` times, mapped to their
    /// most frequent observed form
    pub fn suggested_glossary(&self, min_occurrences: u32) -> HashMap<String, String> {
        let mut suggested = HashMap::new();

        for (key, observed) in &self.auto_glossary_candidates {
            let Some((best, count)) = observed.iter().max_by_key(|(_, c)| **c) else { continue };
            if *count >= min_occurrences {
                suggested.insert(key.clone(), best.clone());
            }
        }

        suggested
    }
}
