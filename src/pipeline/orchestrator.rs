/*!
 * Per-file translation orchestration.
 *
 * Drives one subtitle file end-to-end: parse, glossary load and optional
 * LLM pre-scan, classification, deduplication, cache probes, batched or
 * line-by-line backend calls, response cleaning, validation with
 * self-consistency retry, cache writes, and reconstruction of the
 * translated file. Partial success is always written; cancellation leaves
 * the output file unwritten.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::app_config::{BackendKind, Config};
use crate::backends::TranslationBackend;
use crate::cache::TranslationCache;
use crate::cancellation::{CancellationToken, WorkerGuard};
use crate::classifier::{LineClass, LineClassifier};
use crate::errors::{AppError, BackendError};
use crate::file_utils::FileManager;
use crate::glossary::{GlossaryStore, parse_prescan_response};
use crate::job::{JobStats, SeriesMetadata, TranslationJob};
use crate::progress::{ProgressReporter, ReportLevel};
use crate::prompts::{PromptBuilder, PromptPayload, TranslationProfile};
use crate::subtitle::{SubtitleDocument, SubtitleFormat};
use crate::validator::{FileQuality, Validator};

use super::cleaner::ResponseCleaner;
use super::scheduler::Scheduler;

/// Glossary terms injected per prompt
const GLOSSARY_BUDGET: usize = 200;
/// Dialogue lines sampled for the LLM glossary pre-scan
const PRESCAN_LINES: usize = 80;
/// Occurrences before an auto-glossary candidate is merged
const AUTO_GLOSSARY_MIN_OCCURRENCES: u32 = 3;

/// Tiny built-in table for interjections the models reliably get wrong
static SIMPLE_PHRASES: &[(&str, &str)] = &[
    ("Shit!", "Merda!"),
    ("Damn!", "Droga!"),
    ("Roger.", "Entendido."),
    ("Roger!", "Entendido!"),
    ("Later!", "Até mais!"),
    ("What?!", "O quê?!"),
    ("Wha...", "O quê..."),
    ("Um...", "Hum..."),
    ("Uh...", "Ah..."),
    ("Y-Yes...", "S-Sim..."),
    ("I repeat.", "Repito."),
    ("A hostage?!", "Um refém?!"),
    ("Don't......", "Não..."),
    ("Please don't......", "Por favor, não..."),
    ("Stop it already......", "Pare com isso..."),
];

/// Outcome of one file
#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub skipped: bool,
    pub stats: JobStats,
    pub quality: Option<FileQuality>,
}

/// One unique dialogue line with its cache context
struct UniqueLine {
    text: String,
    prev: String,
    next: String,
}

/// Drives subtitle files through the full translation pipeline
pub struct Orchestrator {
    config: Config,
    profile: TranslationProfile,
    builder: PromptBuilder,
    classifier: LineClassifier,
    validator: Validator,
    cleaner: ResponseCleaner,
    cache: Arc<TranslationCache>,
    glossary: Arc<GlossaryStore>,
    backend: Arc<dyn TranslationBackend>,
    scheduler: Arc<Scheduler>,
    token: CancellationToken,
    reporter: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        cache: Arc<TranslationCache>,
        glossary: Arc<GlossaryStore>,
        backend: Arc<dyn TranslationBackend>,
        scheduler: Arc<Scheduler>,
        token: CancellationToken,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let profile = TranslationProfile::from_config(&config.translation);
        let builder = PromptBuilder::new(profile.clone());
        let validator = Validator::new(&config.target_lang);
        let cleaner = ResponseCleaner::new(
            &config.source_lang,
            &config.target_lang,
            config.translation.enable_explanation_pruning,
        );

        Self {
            config,
            profile,
            builder,
            classifier: LineClassifier::new(),
            validator,
            cleaner,
            cache,
            glossary,
            backend,
            scheduler,
            token,
            reporter,
        }
    }

    /// Source language for prompts and cache keys; "auto" reads as English
    fn effective_source_lang(&self) -> &str {
        if self.config.source_lang == "auto" { "en" } else { &self.config.source_lang }
    }

    /// Translate a set of files with bounded parallelism. Output order of
    /// the returned outcomes matches the input order; completion order
    /// across files is unspecified.
    pub async fn run(
        self: &Arc<Self>,
        files: Vec<(PathBuf, Option<i64>, Option<SeriesMetadata>)>,
    ) -> Vec<Result<FileOutcome, AppError>> {
        let tasks = files.into_iter().enumerate().map(|(index, (path, series_id, metadata))| {
            let this = self.clone();
            async move {
                let _permit = this.scheduler.acquire().await;
                if this.token.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                let _worker = WorkerGuard::new(&this.token, index as u64);
                this.translate_file(&path, series_id, metadata).await
            }
        });

        join_all(tasks).await
    }

    /// Translate one subtitle file end-to-end
    pub async fn translate_file(
        &self,
        path: &Path,
        series_id: Option<i64>,
        metadata: Option<SeriesMetadata>,
    ) -> Result<FileOutcome, AppError> {
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        self.reporter.file_started(&name);

        // 1. Skip already-translated files
        let output_path = FileManager::output_path_for(path, &self.config.target_lang);
        if self.config.skip_existing && output_path.exists() {
            info!("Already translated, skipping: {}", name);
            return Ok(FileOutcome {
                input: path.to_path_buf(),
                output: Some(output_path),
                skipped: true,
                stats: JobStats::default(),
                quality: None,
            });
        }

        // 2. Parse
        let doc = SubtitleDocument::parse_file(path)?;

        let mut job = TranslationJob::new(self.profile.clone());
        if let Some(metadata) = metadata {
            job.metadata = metadata;
        }

        // Backend readiness and warmup come first; a dead backend degrades
        // to a verbatim copy instead of failing the file
        let backend_ready = match self.scheduler.ensure_warm(&self.backend).await {
            Ok(()) => true,
            Err(e) => {
                self.reporter.message(
                    ReportLevel::Warning,
                    &format!("Backend not ready ({}); keeping lines untranslated", e),
                );
                false
            }
        };

        // 3-4. Glossary document, with a one-time LLM pre-scan per series
        if let Some(id) = series_id {
            if backend_ready {
                self.maybe_prescan(id, &doc, &job).await;
            }
            job.glossary = Some(self.glossary.budgeted_view(Some(id), GLOSSARY_BUDGET));
        }

        // 5. Classify every cue
        let entries = doc.entries();
        let mut outputs: Vec<String> = Vec::with_capacity(entries.len());
        let mut dialogue_slots: Vec<Option<usize>> = vec![None; entries.len()];
        let mut unique: Vec<UniqueLine> = Vec::new();
        let mut first_occurrence: Vec<usize> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        // Neighboring cue texts feed the contextual cache keys
        let plain_texts: Vec<String> =
            entries.iter().map(|e| e.plain_text.clone()).collect();

        for (idx, entry) in entries.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            // Pure override blocks strip to nothing; classify the raw text
            // so they surface as technical tags
            let input =
                if entry.plain_text.is_empty() { &entry.raw_text } else { &entry.plain_text };
            let classified = self.classifier.classify(input);

            job.stats.total_lines += 1;
            match classified.class {
                LineClass::Dialogue => {
                    job.stats.classified_dialogue += 1;
                    let text = classified.text.clone();
                    let slot = match seen.get(&text) {
                        Some(&slot) => slot,
                        None => {
                            let slot = unique.len();
                            let prev = idx
                                .checked_sub(1)
                                .map(|p| plain_texts[p].clone())
                                .unwrap_or_default();
                            let next =
                                plain_texts.get(idx + 1).cloned().unwrap_or_default();
                            unique.push(UniqueLine { text: text.clone(), prev, next });
                            first_occurrence.push(idx);
                            seen.insert(text, slot);
                            slot
                        }
                    };
                    dialogue_slots[idx] = Some(slot);
                    outputs.push(entry.plain_text.clone());
                }
                LineClass::SoundEffect => {
                    job.stats.classified_sfx += 1;
                    job.stats.successful_translations += 1;
                    outputs.push(classified.text);
                }
                LineClass::Music => {
                    job.stats.classified_music += 1;
                    outputs.push(entry.plain_text.clone());
                }
                LineClass::TechnicalTag => {
                    job.stats.classified_tag += 1;
                    outputs.push(entry.plain_text.clone());
                }
                LineClass::Untranslatable => {
                    job.stats.classified_untranslatable += 1;
                    outputs.push(entry.plain_text.clone());
                }
            }
        }

        // 6-7. Translate the unique dialogue lines
        let translations =
            self.translate_uniques(&unique, &mut job, doc.format(), backend_ready).await?;

        // 8. Reapply through the dedupe index map
        for (idx, slot) in dialogue_slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let Some(translated) = &translations[*slot] else { continue };

            outputs[idx] = translated.clone();
            if first_occurrence[*slot] != idx {
                // Duplicates reuse the first result: an in-file cache hit
                job.stats.cache_hits += 1;
                job.stats.successful_translations += 1;
            }
        }

        if self.token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let content = doc.emit(&outputs)?;
        FileManager::write_subtitle(&output_path, &content)
            .map_err(|e| AppError::File(e.to_string()))?;
        self.reporter.progress(100);
        self.reporter.file_finished(&name);

        // Per-file quality is advisory only
        let dialogue_outputs: Vec<String> = dialogue_slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| outputs[idx].clone())
            .collect();
        let quality = if dialogue_outputs.is_empty() {
            None
        } else {
            let quality = self.validator.file_quality(&dialogue_outputs);
            if let Some(ref advisory) = quality.advisory {
                self.reporter.message(ReportLevel::Warning, advisory);
            }
            Some(quality)
        };

        // 9. Feed learned terms back into the series glossary
        if let Some(id) = series_id {
            let suggested = job.suggested_glossary(AUTO_GLOSSARY_MIN_OCCURRENCES);
            if !suggested.is_empty() {
                self.glossary.merge_auto(id, &suggested, AUTO_GLOSSARY_MIN_OCCURRENCES);
            }
        }

        info!("{}: {}", name, job.stats.summary());
        let stats = job.stats.clone();

        Ok(FileOutcome {
            input: path.to_path_buf(),
            output: Some(output_path),
            skipped: false,
            stats,
            quality,
        })
    }

    /// One-time glossary pre-scan: sample dialogue lines and ask the model
    /// for the proper nouns to preserve. Runs only for LLM backends and
    /// only while the series has never been scanned.
    async fn maybe_prescan(&self, series_id: i64, doc: &SubtitleDocument, job: &TranslationJob) {
        if !self.profile.enable_auto_glossary || !self.backend.kind().is_llm() {
            return;
        }
        let scanned = self
            .glossary
            .load(series_id)
            .map(|doc| doc.episodes_scanned)
            .unwrap_or(0);
        if scanned > 0 {
            return;
        }

        let sample: Vec<&str> = doc
            .entries()
            .iter()
            .map(|e| e.plain_text.as_str())
            .filter(|t| !t.trim().is_empty())
            .take(PRESCAN_LINES)
            .collect();
        if sample.is_empty() || self.token.is_cancelled() {
            return;
        }

        let user = format!(
            "Analyze these subtitle lines and extract ALL proper nouns (character names, places, techniques, titles). \
             Reply ONLY with a JSON object: {{\"OriginalName\": \"PreservedName\", ...}}. \
             Preserve the original form (do not translate).\n\nLines:\n{}",
            sample.join("\n")
        );
        let prompt = crate::prompts::Prompt {
            source_lang: self.effective_source_lang().to_string(),
            target_lang: self.config.target_lang.clone(),
            payload: PromptPayload::Llm {
                system: String::new(),
                user,
                options: self.profile.batch_options(1024),
            },
        };

        match self.backend.translate(&prompt).await {
            Ok(response) => {
                let terms = parse_prescan_response(&response);
                if terms.is_empty() {
                    debug!("Pre-scan returned no usable terms for series {}", series_id);
                } else {
                    info!(
                        "Pre-scan extracted {} terms for \"{}\"",
                        terms.len(),
                        job.metadata.title
                    );
                    self.glossary.merge_prescan(series_id, &terms);
                }
            }
            Err(e) => warn!("Glossary pre-scan failed: {}", e),
        }
    }

    /// Translate the unique dialogue lines: simple-phrase table, cache
    /// probes, then batched or line-by-line backend calls.
    async fn translate_uniques(
        &self,
        unique: &[UniqueLine],
        job: &mut TranslationJob,
        format: SubtitleFormat,
        backend_ready: bool,
    ) -> Result<Vec<Option<String>>, AppError> {
        let source_lang = self.effective_source_lang().to_string();
        let target_lang = self.config.target_lang.clone();

        let mut results: Vec<Option<String>> = (0..unique.len()).map(|_| None).collect();
        let mut pending: Vec<usize> = Vec::new();

        // Simple phrases and cache probes never touch the backend
        for (i, line) in unique.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            if let Some(simple) = simple_phrase(&line.text, &source_lang, &target_lang) {
                job.stats.successful_translations += 1;
                results[i] = Some(simple.to_string());
                continue;
            }

            if let Some(cached) =
                self.cache.get(&line.text, &source_lang, &target_lang, &line.prev, &line.next)
            {
                if cached.trim().to_lowercase() != line.text.trim().to_lowercase() {
                    job.stats.cache_hits += 1;
                    job.stats.successful_translations += 1;
                    job.add_context(&cached);
                    results[i] = Some(cached);
                    continue;
                }
                warn!("Cached translation identical to original, retranslating");
            }

            job.stats.cache_misses += 1;
            pending.push(i);
        }

        if pending.is_empty() {
            return Ok(results);
        }
        if !backend_ready || !self.scheduler.backend_available() {
            job.stats.api_failures += pending.len() as u64;
            return Ok(results);
        }

        let total_work = pending.len();
        let mut done = 0usize;

        // Batch pass for local LLMs when enabled
        let batch_size = self.scheduler.batch_size_for(format);
        let use_batches = self.profile.enable_batch_mode
            && batch_size >= 2
            && self.backend.kind() == BackendKind::LocalLlm;

        let mut queue = pending;
        if use_batches {
            let mut rest: Vec<usize> = Vec::new();
            let mut cursor = 0;

            while cursor < queue.len() {
                if self.token.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                if !self.scheduler.batch_enabled() || !self.scheduler.backend_available() {
                    rest.extend_from_slice(&queue[cursor..]);
                    break;
                }

                let end = (cursor + batch_size).min(queue.len());
                let chunk = &queue[cursor..end];
                cursor = end;

                if chunk.len() < 2 {
                    rest.extend_from_slice(chunk);
                    continue;
                }

                let texts: Vec<String> =
                    chunk.iter().map(|&i| unique[i].text.clone()).collect();
                let prompt = self.builder.build_batch(&texts, job, &source_lang, &target_lang);

                match self.backend.translate_batch(&prompt, texts.len()).await {
                    Ok(Some(slots)) => {
                        self.scheduler.record_batch_success();
                        for (&slot_index, maybe_raw) in chunk.iter().zip(slots) {
                            match maybe_raw {
                                Some(raw) => {
                                    results[slot_index] = self
                                        .post_process(&unique[slot_index], &raw, job)
                                        .await;
                                }
                                // Missing slots are retried individually,
                                // never silently dropped
                                None => rest.push(slot_index),
                            }
                            done += 1;
                            self.report_progress(done, total_work);
                        }
                    }
                    Ok(None) => {
                        self.scheduler.record_batch_failure();
                        rest.extend_from_slice(chunk);
                    }
                    Err(e) => {
                        self.scheduler.record_batch_failure();
                        self.handle_backend_error(&e, job);
                        rest.extend_from_slice(chunk);
                    }
                }
            }

            queue = rest;
        }

        // Line-by-line pass
        for &slot_index in &queue {
            if self.token.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            if !self.scheduler.backend_available() {
                job.stats.api_failures += 1;
                continue;
            }

            results[slot_index] = self.translate_single(&unique[slot_index], job).await;
            done += 1;
            self.report_progress(done.min(total_work), total_work);
        }

        Ok(results)
    }

    /// Translate one line through the backend and post-process the result.
    /// Returns None when the line could not be translated; the original is
    /// kept verbatim by the caller.
    async fn translate_single(
        &self,
        line: &UniqueLine,
        job: &mut TranslationJob,
    ) -> Option<String> {
        let source_lang = self.effective_source_lang().to_string();
        let prompt = self.builder.build(
            self.backend.kind(),
            &line.text,
            job,
            &source_lang,
            &self.config.target_lang,
        );

        match self.backend.translate(&prompt).await {
            Ok(raw) => self.post_process(line, &raw, job).await,
            Err(e) => {
                self.handle_backend_error(&e, job);
                None
            }
        }
    }

    /// Clean, apply the glossary, validate, optionally run the
    /// self-consistency retry, and cache a successful result.
    async fn post_process(
        &self,
        line: &UniqueLine,
        raw: &str,
        job: &mut TranslationJob,
    ) -> Option<String> {
        let source_lang = self.effective_source_lang().to_string();
        let target_lang = self.config.target_lang.clone();

        let mut candidate = self.cleaner.clean(raw);
        if candidate.is_empty() {
            job.stats.api_failures += 1;
            return None;
        }
        candidate = self.glossary.apply_to_text(&candidate, job.glossary.as_ref());

        if candidate.trim().to_lowercase() == line.text.trim().to_lowercase() {
            debug!("Backend returned the original text for '{}'", line.text);
            job.stats.api_failures += 1;
            return None;
        }

        let mut validation = self.validator.validate_line(&line.text, &candidate);

        // Low confidence on a local model: re-translate hotter and keep
        // the better of the two
        if validation.confidence < 0.6 && self.backend.kind() == BackendKind::LocalLlm {
            if let Some(second) = self.self_consistency(line, job).await {
                if second.trim().to_lowercase() != candidate.trim().to_lowercase()
                    && (second.trim().len() as f32) < candidate.trim().len() as f32 * 0.8
                {
                    debug!("Self-consistency picked the more concise retry");
                    candidate = second;
                    validation = self.validator.validate_line(&line.text, &candidate);
                }
            }
        }

        if !validation.valid {
            warn!("Validation rejected '{}': {}", line.text, validation.message);
            job.stats.validation_rejections += 1;
            return None;
        }
        if validation.message != "OK" {
            debug!("Validation issues for '{}': {}", line.text, validation.message);
        }
        if !self.validator.is_colloquial_valid(&candidate) {
            debug!("Unusually dense colloquialisms in '{}'", candidate);
        }

        self.cache.set(
            &line.text,
            &candidate,
            &source_lang,
            &target_lang,
            self.backend.name(),
            &line.prev,
            &line.next,
        );

        job.stats.successful_translations += 1;
        job.add_context(&candidate);
        job.track_auto_glossary(&line.text, &candidate);
        Some(candidate)
    }

    /// Self-consistency retry: same line, temperature raised by 0.3
    /// (capped at 0.7). Returns the cleaned second translation.
    async fn self_consistency(&self, line: &UniqueLine, job: &mut TranslationJob) -> Option<String> {
        job.stats.self_consistency_triggered += 1;

        let mut hot_profile = self.profile.clone();
        hot_profile.temperature = (hot_profile.temperature + 0.3).min(0.7);
        let hot_builder = PromptBuilder::new(hot_profile);

        let source_lang = self.effective_source_lang().to_string();
        let prompt = hot_builder.build(
            self.backend.kind(),
            &line.text,
            job,
            &source_lang,
            &self.config.target_lang,
        );

        match self.backend.translate(&prompt).await {
            Ok(raw) => {
                let cleaned = self.cleaner.clean(&raw);
                if cleaned.is_empty() || cleaned.trim() == line.text.trim() {
                    return None;
                }
                Some(self.glossary.apply_to_text(&cleaned, job.glossary.as_ref()))
            }
            Err(e) => {
                debug!("Self-consistency retry failed: {}", e);
                None
            }
        }
    }

    fn handle_backend_error(&self, error: &BackendError, job: &mut TranslationJob) {
        job.stats.api_failures += 1;
        match error {
            BackendError::QuotaExceeded(_) => {
                self.reporter.message(
                    ReportLevel::Error,
                    "Backend quota exhausted; remaining lines stay untranslated",
                );
                self.scheduler.mark_backend_unavailable();
            }
            BackendError::ModelMissing(model) => {
                self.reporter.message(
                    ReportLevel::Error,
                    &format!("Model {} is not available; install it and re-run", model),
                );
                self.scheduler.mark_backend_unavailable();
            }
            other => warn!("Backend call failed: {}", other),
        }
    }

    fn report_progress(&self, done: usize, total: usize) {
        if total > 0 {
            let percent = ((done as f64 / total as f64) * 100.0) as u8;
            self.reporter.progress(percent.min(100));
        }
    }
}

/// Built-in translations for interjections, consulted before the cache
fn simple_phrase(text: &str, source_lang: &str, target_lang: &str) -> Option<&'static str> {
    if source_lang != "en" || target_lang != "pt-BR" {
        return None;
    }
    let text = text.trim();
    SIMPLE_PHRASES
        .iter()
        .find(|(en, _)| *en == text)
        .map(|(_, pt)| *pt)
}
