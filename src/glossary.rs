/*!
 * Per-series glossary persistence and term learning.
 *
 * Each series gets one JSON document (`series_<id>.json`, schema v2) of
 * terms that must survive translation: character names, techniques,
 * honorifics. Documents are written atomically (temp + rename) under a
 * per-series lock, v1 documents migrate on read, and auto-learned terms
 * pass an anti-poisoning filter before they are merged.
 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current glossary document schema
pub const SCHEMA_VERSION: u32 = 2;

/// Stopwords never accepted as auto-learned keys
static GLOSSARY_STOPWORDS: &[&str] = &[
    "the", "and", "for", "you", "are", "not", "but", "his", "her", "has", "had",
    "was", "all", "can", "out", "did", "get", "him", "say", "she", "they", "this",
    "with", "that", "from", "have", "will", "one", "yes", "no", "ok", "oh", "ah",
];

/// Where a term came from; drives derived confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermSource {
    Sonarr,
    Anilist,
    LlmPrescan,
    AutoTrack,
    Manual,
    Migrated,
}

impl TermSource {
    fn base_confidence(&self) -> f64 {
        match self {
            Self::Manual => 0.95,
            Self::Sonarr => 0.9,
            Self::Anilist => 0.85,
            Self::LlmPrescan => 0.75,
            Self::Migrated => 0.7,
            Self::AutoTrack => 0.5,
        }
    }
}

/// One glossary term. The key (lowercased source form) lives in the map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryTerm {
    /// Target form to enforce
    pub value: String,
    /// Origin of the term
    pub source: TermSource,
    /// Times the term was observed
    #[serde(default = "default_count")]
    pub count: u32,
    /// Pinned terms never expire and always rank first
    #[serde(default)]
    pub pinned: bool,
    /// Last observation timestamp (RFC 3339, UTC)
    #[serde(default)]
    pub last_seen: String,
}

fn default_count() -> u32 {
    1
}

impl GlossaryTerm {
    /// Derived confidence: pinned is absolute, otherwise base-by-source
    /// plus an occurrence boost capped at 0.2. Not stored.
    pub fn confidence(&self) -> f64 {
        if self.pinned {
            return 1.0;
        }
        let boost = (self.count as f64 * 0.02).min(0.2);
        (self.source.base_confidence() + boost).min(1.0)
    }
}

/// Schema-versioned glossary document for one series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesGlossary {
    pub schema_version: u32,
    pub terms: BTreeMap<String, GlossaryTerm>,
    #[serde(default)]
    pub episodes_scanned: u32,
    #[serde(default)]
    pub updated_at: String,
}

impl SeriesGlossary {
    /// Fresh empty document
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            terms: BTreeMap::new(),
            episodes_scanned: 0,
            updated_at: now_iso(),
        }
    }
}

/// Store managing per-series glossary documents plus the bundled global
/// glossary. Process-wide; documents are mutated only under a per-series
/// lock and never while network I/O is in flight.
pub struct GlossaryStore {
    storage_dir: PathBuf,
    global: BTreeMap<String, String>,
    series_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    docs: Mutex<HashMap<i64, SeriesGlossary>>,
    /// Series whose on-disk document failed to parse; quarantined on the
    /// next successful save instead of being overwritten
    corrupt: Mutex<HashSet<i64>>,
}

impl GlossaryStore {
    /// Store rooted at `storage_dir` with the bundled global glossary
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            global: global_glossary(),
            series_locks: Mutex::new(HashMap::new()),
            docs: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
        }
    }

    /// The bundled global glossary
    pub fn global_terms(&self) -> &BTreeMap<String, String> {
        &self.global
    }

    fn series_lock(&self, series_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.series_locks.lock();
        locks.entry(series_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn path_for(&self, series_id: i64) -> PathBuf {
        self.storage_dir.join(format!("series_{}.json", series_id))
    }

    /// Load a series document, migrating v1 content on read. A corrupt or
    /// unreadable file logs a warning and yields None; the bad file is left
    /// in place and renamed aside on the next successful save.
    pub fn load(&self, series_id: i64) -> Option<SeriesGlossary> {
        if let Some(doc) = self.docs.lock().get(&series_id) {
            return Some(doc.clone());
        }

        let path = self.path_for(series_id);
        if !path.exists() {
            return None;
        }

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Glossary for series {} is unreadable: {}", series_id, e);
                self.corrupt.lock().insert(series_id);
                return None;
            }
        };

        let doc = match parse_document(&raw) {
            Some(doc) => doc,
            None => {
                warn!("Glossary for series {} is corrupt, starting empty", series_id);
                self.corrupt.lock().insert(series_id);
                return None;
            }
        };

        self.docs.lock().insert(series_id, doc.clone());
        Some(doc)
    }

    /// Persist a document atomically, stamping `updated_at` and the schema
    /// version. Returns false (and logs) on failure instead of erroring the
    /// translation run.
    pub fn save(&self, series_id: i64, doc: &SeriesGlossary) -> bool {
        let lock = self.series_lock(series_id);
        let _guard = lock.lock();
        self.save_locked(series_id, doc)
    }

    fn save_locked(&self, series_id: i64, doc: &SeriesGlossary) -> bool {
        let mut doc = doc.clone();
        doc.schema_version = SCHEMA_VERSION;
        doc.updated_at = now_iso();

        if let Err(e) = std::fs::create_dir_all(&self.storage_dir) {
            warn!("Cannot create glossary dir {:?}: {}", self.storage_dir, e);
            return false;
        }

        let path = self.path_for(series_id);

        // A previously corrupt file is preserved for inspection
        if self.corrupt.lock().remove(&series_id) && path.exists() {
            let quarantine = path.with_extension(format!("corrupt.{}", Utc::now().timestamp()));
            if let Err(e) = std::fs::rename(&path, &quarantine) {
                warn!("Could not quarantine corrupt glossary {:?}: {}", path, e);
            }
        }

        let result = (|| -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.storage_dir)?;
            serde_json::to_writer_pretty(&mut tmp, &doc)?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.docs.lock().insert(series_id, doc);
                true
            }
            Err(e) => {
                warn!("Failed to save glossary for series {}: {}", series_id, e);
                false
            }
        }
    }

    /// Budgeted flat view for prompt injection: pinned terms first, then by
    /// derived confidence, then by count; remaining budget is filled from
    /// the global glossary.
    pub fn budgeted_view(&self, series_id: Option<i64>, max_terms: usize) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();

        if let Some(id) = series_id {
            if let Some(doc) = self.load(id) {
                let mut items: Vec<(&String, &GlossaryTerm)> = doc.terms.iter().collect();
                items.sort_by(|(_, a), (_, b)| {
                    b.pinned
                        .cmp(&a.pinned)
                        .then(b.confidence().partial_cmp(&a.confidence()).unwrap_or(std::cmp::Ordering::Equal))
                        .then(b.count.cmp(&a.count))
                });

                for (key, term) in items {
                    if result.len() >= max_terms {
                        break;
                    }
                    result.insert(key.clone(), term.value.clone());
                }
            }
        }

        for (key, value) in &self.global {
            if result.len() >= max_terms {
                break;
            }
            result.entry(key.clone()).or_insert_with(|| value.clone());
        }

        result
    }

    /// Merge auto-learned candidates into a series document. All three
    /// anti-poisoning filters are enforced together: key length, stopword
    /// set, and target length/word-count caps. Accepted new terms are
    /// tagged `auto_track`; existing auto-tracked terms take the higher
    /// count. Increments `episodes_scanned`.
    pub fn merge_auto(
        &self,
        series_id: i64,
        candidates: &HashMap<String, String>,
        min_occurrences: u32,
    ) {
        if candidates.is_empty() {
            return;
        }

        let lock = self.series_lock(series_id);
        let _guard = lock.lock();

        let mut doc = self
            .docs
            .lock()
            .get(&series_id)
            .cloned()
            .or_else(|| self.load_unlocked(series_id))
            .unwrap_or_else(SeriesGlossary::empty);

        let now = now_iso();
        let mut added = 0;

        for (term, translation) in candidates {
            if !is_safe_suggested_term(term, translation) {
                continue;
            }
            let key = term.trim().to_lowercase();

            match doc.terms.get(&key) {
                None => {
                    doc.terms.insert(
                        key,
                        GlossaryTerm {
                            value: translation.trim().to_string(),
                            source: TermSource::AutoTrack,
                            count: min_occurrences,
                            pinned: false,
                            last_seen: now.clone(),
                        },
                    );
                    added += 1;
                }
                Some(existing) if existing.source == TermSource::AutoTrack => {
                    let count = existing.count.max(min_occurrences);
                    let pinned = existing.pinned;
                    doc.terms.insert(
                        key,
                        GlossaryTerm {
                            value: translation.trim().to_string(),
                            source: TermSource::AutoTrack,
                            count,
                            pinned,
                            last_seen: now.clone(),
                        },
                    );
                }
                // Higher-trust sources are never overwritten by auto-learning
                Some(_) => {}
            }
        }

        doc.episodes_scanned += 1;
        if added > 0 {
            info!("Auto glossary: +{} terms for series {}", added, series_id);
        }
        self.save_locked(series_id, &doc);
    }

    /// Merge LLM pre-scan terms (source `llm_prescan`). Idempotent: already
    /// present keys are untouched. The first pre-scan marks the series as
    /// scanned so it is not re-scanned per episode.
    pub fn merge_prescan(&self, series_id: i64, terms: &HashMap<String, String>) {
        if terms.is_empty() {
            return;
        }

        let lock = self.series_lock(series_id);
        let _guard = lock.lock();

        let mut doc = self
            .docs
            .lock()
            .get(&series_id)
            .cloned()
            .or_else(|| self.load_unlocked(series_id))
            .unwrap_or_else(SeriesGlossary::empty);

        let now = now_iso();
        for (key, value) in terms {
            let key = key.trim().to_lowercase();
            if key.len() < 2 {
                continue;
            }
            doc.terms.entry(key).or_insert_with(|| GlossaryTerm {
                value: value.trim().to_string(),
                source: TermSource::LlmPrescan,
                count: 1,
                pinned: false,
                last_seen: now.clone(),
            });
        }

        doc.episodes_scanned = 1;
        self.save_locked(series_id, &doc);
        debug!("Pre-scan merged {} terms for series {}", terms.len(), series_id);
    }

    /// Load without the doc-cache fast path, used while holding the series lock
    fn load_unlocked(&self, series_id: i64) -> Option<SeriesGlossary> {
        let path = self.path_for(series_id);
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(&path).ok()?;
        parse_document(&raw)
    }

    /// Apply glossary substitutions to translated text: case-insensitive
    /// whole-word matches, preserving the original case pattern. Series
    /// terms override the global glossary.
    pub fn apply_to_text(&self, text: &str, series_view: Option<&BTreeMap<String, String>>) -> String {
        if text.is_empty() {
            return text.to_string();
        }

        let mut combined: BTreeMap<&str, &str> =
            self.global.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        if let Some(series) = series_view {
            for (k, v) in series {
                combined.insert(k.as_str(), v.as_str());
            }
        }

        let mut result = text.to_string();
        for (source, target) in combined {
            if target.is_empty() || !contains_ignore_case(&result, source) {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(source));
            let Ok(re) = Regex::new(&pattern) else { continue };

            result = re
                .replace_all(&result, |caps: &regex::Captures| {
                    apply_case_pattern(&caps[0], target)
                })
                .into_owned();
        }

        result
    }
}

/// Parse a glossary document, migrating v1 (flat string map) idempotently
fn parse_document(raw: &str) -> Option<SeriesGlossary> {
    let value: Value = serde_json::from_str(raw).ok()?;

    let schema_version = value.get("schema_version").and_then(|v| v.as_u64()).unwrap_or(1);
    if schema_version == SCHEMA_VERSION as u64 {
        if let Ok(doc) = serde_json::from_value::<SeriesGlossary>(value.clone()) {
            return Some(doc);
        }
        // Fall through to migration for partially valid documents
    }

    let obj = value.as_object()?;
    let now = now_iso();
    let mut terms = BTreeMap::new();

    if let Some(raw_terms) = obj.get("terms").and_then(|t| t.as_object()) {
        for (key, v) in raw_terms {
            match v {
                Value::String(s) => {
                    terms.insert(
                        key.to_lowercase(),
                        GlossaryTerm {
                            value: s.clone(),
                            source: TermSource::Migrated,
                            count: 1,
                            pinned: false,
                            last_seen: now.clone(),
                        },
                    );
                }
                Value::Object(_) => {
                    if let Ok(term) = serde_json::from_value::<GlossaryTerm>(v.clone()) {
                        terms.insert(key.to_lowercase(), term);
                    }
                }
                _ => {}
            }
        }
    }

    Some(SeriesGlossary {
        schema_version: SCHEMA_VERSION,
        terms,
        episodes_scanned: obj
            .get("episodes_scanned")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        updated_at: now,
    })
}

/// Anti-poisoning filter for auto-learned terms
fn is_safe_suggested_term(term: &str, translation: &str) -> bool {
    let key = term.trim().to_lowercase();
    if key.len() < 3 {
        return false;
    }
    if GLOSSARY_STOPWORDS.contains(&key.as_str()) {
        return false;
    }
    if translation.len() > 80 || translation.split_whitespace().count() > 10 {
        return false;
    }
    true
}

/// Parse an LLM pre-scan response: a JSON object first, then a line-based
/// fallback accepting `key: value`, `key -> value` and `key → value`.
pub fn parse_prescan_response(text: &str) -> HashMap<String, String> {
    let text = text.trim();

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..=end]) {
                let mut result = HashMap::new();
                for (k, v) in map {
                    if let Some(v) = v.as_str() {
                        let key = k.trim().to_lowercase();
                        if !key.is_empty() && !v.trim().is_empty() {
                            result.insert(key, v.trim().to_string());
                        }
                    }
                }
                if !result.is_empty() {
                    return result;
                }
            }
        }
    }

    let mut result = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        for sep in ["->", "→", ":"] {
            if let Some((k, v)) = line.split_once(sep) {
                let k = k.trim().trim_matches(['"', '\'']);
                let v = v.trim().trim_matches(['"', '\'']);
                if k.len() >= 2 && !v.is_empty() {
                    result.insert(k.to_lowercase(), v.to_string());
                }
                break;
            }
        }
    }
    result
}

/// Replicate the case pattern of `matched` onto `replacement`:
/// ALL CAPS, Initial-Cap, or lowercase as written.
fn apply_case_pattern(matched: &str, replacement: &str) -> String {
    if replacement.is_empty() {
        return matched.to_string();
    }
    if matched.chars().all(|c| !c.is_lowercase()) && matched.chars().any(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if matched.chars().next().is_some_and(|c| c.is_uppercase()) && matched.chars().count() > 1 {
        let mut chars = replacement.chars();
        let first = chars.next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
        return format!("{}{}", first, chars.as_str());
    }
    replacement.to_string()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Bundled well-known terms (EN/romaji -> pt-BR) for anime and live-action
/// subtitles. Series documents override these.
fn global_glossary() -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = &[
        // Honorifics and address forms stay as-is
        ("senpai", "senpai"), ("sempai", "senpai"), ("sensei", "sensei"),
        ("sama", "sama"), ("san", "san"), ("kun", "kun"), ("chan", "chan"),
        ("dono", "dono"), ("kouhai", "kouhai"),
        ("onii-san", "onii-san"), ("onii-chan", "onii-chan"),
        ("onee-san", "onee-san"), ("onee-chan", "onee-chan"),
        ("ojou-sama", "ojou-sama"),
        // Common interjections
        ("arigato", "arigato"), ("arigatou", "arigato"),
        ("sumimasen", "sumimasen"), ("gomennasai", "gomennasai"), ("gomen", "gomen"),
        ("baka", "idiota"), ("kawaii", "fofinho"), ("sugoi", "incrível"),
        ("nani", "o quê"), ("yatta", "consegui"), ("yokatta", "que bom"),
        ("hai", "sim"), ("iie", "não"), ("masaka", "não pode ser"),
        ("naruhodo", "entendo"), ("sasuga", "como esperado"),
        ("yappari", "como eu pensava"), ("shouganai", "não tem jeito"),
        ("ganbatte", "boa sorte"), ("ganbare", "vai lá"),
        ("omedetou", "parabéns"), ("tasukete", "me ajude"),
        ("itadakimasu", "itadakimasu"), ("tadaima", "tadaima"), ("okaeri", "okaeri"),
        // Genre concepts
        ("tsundere", "tsundere"), ("yandere", "yandere"), ("otaku", "otaku"),
        ("isekai", "isekai"), ("shounen", "shounen"), ("shoujo", "shoujo"),
        ("seinen", "seinen"), ("josei", "josei"), ("chibi", "chibi"),
        ("nakama", "companheiro"), ("harem", "harém"),
        ("youkai", "youkai"), ("yokai", "yokai"), ("kami", "kami"),
        ("shinigami", "shinigami"), ("oni", "oni"), ("akuma", "demônio"),
        ("kitsune", "raposa"), ("neko", "gato"),
        // Techniques and powers
        ("jutsu", "jutsu"), ("ninjutsu", "ninjutsu"), ("genjutsu", "genjutsu"),
        ("taijutsu", "taijutsu"), ("chakra", "chakra"), ("ki", "ki"),
        ("kamehameha", "kamehameha"), ("rasengan", "rasengan"),
        ("chidori", "chidori"), ("bankai", "bankai"), ("shikai", "shikai"),
        ("zanpakuto", "zanpakuto"), ("sharingan", "sharingan"),
        ("mahou", "magia"), ("kekkai", "barreira"), ("mana", "mana"),
        ("hissatsu", "golpe mortal"), ("ougi", "técnica secreta"),
        // Titles and roles
        ("buchou", "capitão"), ("taichou", "capitão"), ("kaichou", "presidente"),
        ("shachou", "presidente da empresa"), ("heika", "majestade"),
        ("hime", "princesa"), ("ouji", "príncipe"), ("shogun", "shogun"),
        ("daimyo", "daimyo"), ("samurai", "samurai"), ("ninja", "ninja"),
        ("ronin", "ronin"),
        // Weapons and gear
        ("katana", "katana"), ("wakizashi", "wakizashi"), ("shuriken", "shuriken"),
        ("kunai", "kunai"), ("bokken", "bokken"), ("shinai", "shinai"),
        ("naginata", "naginata"), ("kimono", "quimono"), ("yukata", "yukata"),
        ("hakama", "hakama"),
        // Food and places
        ("sake", "sake"), ("sushi", "sushi"), ("ramen", "ramen"),
        ("bento", "bento"), ("mochi", "mochi"), ("dango", "dango"),
        ("tempura", "tempura"), ("onsen", "onsen"), ("dojo", "dojo"),
        ("izakaya", "izakaia"), ("konbini", "konbini"), ("karaoke", "karaokê"),
        ("matsuri", "matsuri"), ("hanami", "hanami"), ("sakura", "cerejeira"),
        // Family
        ("otou-san", "papai"), ("okaa-san", "mamãe"),
        ("nii-san", "nii-san"), ("nii-chan", "nii-chan"),
        ("ojii-san", "avô"), ("musume", "filha"), ("musuko", "filho"),
        // Relationships
        ("suki", "gosto"), ("daisuki", "amo muito"), ("aishiteru", "te amo"),
        ("koibito", "namorado"), ("kokuhaku", "confissão"), ("kekkon", "casamento"),
        // Battle vocabulary
        ("tatakai", "batalha"), ("sensou", "guerra"), ("shoubu", "duelo"),
        ("kessen", "batalha decisiva"), ("seppuku", "suicídio ritualístico"),
        ("harakiri", "suicídio ritualístico"), ("kamikaze", "kamikaze"),
        ("bushido", "bushido"),
        // Sports and games
        ("sumo", "sumô"), ("karate", "karatê"), ("judo", "judô"),
        ("kendo", "kendô"), ("shougi", "shogi"), ("mahjong", "mahjong"),
        ("pachinko", "pachinko"),
    ];
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, GlossaryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GlossaryStore::new(dir.path());
        (dir, store)
    }

    fn auto_candidates(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_saveAndLoad_shouldRoundTrip() {
        let (_dir, store) = store();

        let mut doc = SeriesGlossary::empty();
        doc.terms.insert(
            "akane".to_string(),
            GlossaryTerm {
                value: "Akane".to_string(),
                source: TermSource::LlmPrescan,
                count: 1,
                pinned: false,
                last_seen: String::new(),
            },
        );

        assert!(store.save(42, &doc));
        let loaded = store.load(42).unwrap();

        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.terms["akane"].value, "Akane");
        assert!(!loaded.updated_at.is_empty());
    }

    #[test]
    fn test_load_v1Document_shouldMigrate() {
        let (dir, store) = store();

        std::fs::write(
            dir.path().join("series_7.json"),
            r#"{"terms": {"Senpai": "senpai", "akane": "Akane"}, "episodes_scanned": 3}"#,
        )
        .unwrap();

        let doc = store.load(7).unwrap();

        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.episodes_scanned, 3);
        let term = &doc.terms["senpai"];
        assert_eq!(term.source, TermSource::Migrated);
        assert_eq!(term.count, 1);
        assert!(!term.pinned);
    }

    #[test]
    fn test_load_corruptDocument_shouldReturnNoneAndQuarantineOnSave() {
        let (dir, store) = store();
        let path = dir.path().join("series_9.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(store.load(9).is_none());
        // Bad file untouched until a successful save
        assert!(path.exists());

        assert!(store.save(9, &SeriesGlossary::empty()));
        assert!(path.exists());
        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains("corrupt"));
        assert!(quarantined, "expected a .corrupt.<ts> file");
    }

    #[test]
    fn test_confidence_derivation() {
        let mut term = GlossaryTerm {
            value: "x".to_string(),
            source: TermSource::AutoTrack,
            count: 1,
            pinned: false,
            last_seen: String::new(),
        };
        assert!((term.confidence() - 0.52).abs() < 1e-9);

        term.count = 100;
        assert!((term.confidence() - 0.7).abs() < 1e-9);

        term.pinned = true;
        assert!((term.confidence() - 1.0).abs() < 1e-9);

        term.pinned = false;
        term.source = TermSource::Sonarr;
        term.count = 100;
        assert!((term.confidence() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_budgetedView_shouldPrioritizePinnedThenConfidence() {
        let (_dir, store) = store();

        let mut doc = SeriesGlossary::empty();
        doc.terms.insert(
            "lowconf".to_string(),
            GlossaryTerm { value: "Low".into(), source: TermSource::AutoTrack, count: 1, pinned: false, last_seen: String::new() },
        );
        doc.terms.insert(
            "pinnedterm".to_string(),
            GlossaryTerm { value: "Pinned".into(), source: TermSource::AutoTrack, count: 1, pinned: true, last_seen: String::new() },
        );
        doc.terms.insert(
            "highconf".to_string(),
            GlossaryTerm { value: "High".into(), source: TermSource::Manual, count: 5, pinned: false, last_seen: String::new() },
        );
        store.save(3, &doc);

        let view = store.budgeted_view(Some(3), 2);

        assert_eq!(view.len(), 2);
        assert!(view.contains_key("pinnedterm"));
        assert!(view.contains_key("highconf"));
        assert!(!view.contains_key("lowconf"));
    }

    #[test]
    fn test_budgetedView_shouldFillWithGlobals() {
        let (_dir, store) = store();
        let view = store.budgeted_view(None, 10);
        assert_eq!(view.len(), 10);
    }

    #[test]
    fn test_mergeAuto_shouldEnforceAllFilters() {
        let (_dir, store) = store();

        let candidates = auto_candidates(&[
            ("ab", "short key rejected"),
            ("the", "stopword rejected"),
            ("akane", "Akane"),
            ("longvalue", &"x".repeat(100)),
            ("manywords", "a b c d e f g h i j k l"),
        ]);
        store.merge_auto(11, &candidates, 3);

        let doc = store.load(11).unwrap();
        assert_eq!(doc.terms.len(), 1);
        assert_eq!(doc.terms["akane"].source, TermSource::AutoTrack);
        assert_eq!(doc.terms["akane"].count, 3);
        assert_eq!(doc.episodes_scanned, 1);
    }

    #[test]
    fn test_mergeAuto_existingAutoTrack_shouldTakeMaxCount() {
        let (_dir, store) = store();

        store.merge_auto(11, &auto_candidates(&[("akane", "Akane")]), 5);
        store.merge_auto(11, &auto_candidates(&[("akane", "Akane")]), 3);

        let doc = store.load(11).unwrap();
        assert_eq!(doc.terms["akane"].count, 5);
        assert_eq!(doc.episodes_scanned, 2);
    }

    #[test]
    fn test_mergeAuto_shouldNotOverwriteHigherTrustSources() {
        let (_dir, store) = store();

        store.merge_prescan(11, &auto_candidates(&[("akane", "Akane")]));
        store.merge_auto(11, &auto_candidates(&[("akane", "Wrong")]), 3);

        let doc = store.load(11).unwrap();
        assert_eq!(doc.terms["akane"].value, "Akane");
        assert_eq!(doc.terms["akane"].source, TermSource::LlmPrescan);
    }

    #[test]
    fn test_mergePrescan_shouldBeIdempotent() {
        let (_dir, store) = store();
        let terms = auto_candidates(&[("akane", "Akane"), ("tokyo", "Tokyo")]);

        store.merge_prescan(5, &terms);
        store.merge_prescan(5, &terms);

        let doc = store.load(5).unwrap();
        assert_eq!(doc.terms.len(), 2);
        assert_eq!(doc.episodes_scanned, 1);
        assert_eq!(doc.terms["akane"].source, TermSource::LlmPrescan);
        assert_eq!(doc.terms["akane"].count, 1);
    }

    #[test]
    fn test_mergeAuto_concurrent_shouldKeepUnion() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GlossaryStore::new(dir.path()));

        let s1 = store.clone();
        let t1 = std::thread::spawn(move || {
            s1.merge_auto(99, &auto_candidates(&[("akane", "Akane")]), 4);
        });
        let s2 = store.clone();
        let t2 = std::thread::spawn(move || {
            s2.merge_auto(99, &auto_candidates(&[("hikari", "Hikari")]), 3);
        });
        t1.join().unwrap();
        t2.join().unwrap();

        let doc = store.load(99).unwrap();
        assert!(doc.terms.contains_key("akane"));
        assert!(doc.terms.contains_key("hikari"));
        assert!(doc.terms["akane"].count >= 4);
        assert!(doc.terms["hikari"].count >= 3);
    }

    #[test]
    fn test_applyToText_shouldPreserveCasePattern() {
        let (_dir, store) = store();

        let mut view = BTreeMap::new();
        view.insert("reaper".to_string(), "shinigami".to_string());

        assert_eq!(store.apply_to_text("The reaper is here", Some(&view)), "The shinigami is here");
        assert_eq!(store.apply_to_text("Reaper is here", Some(&view)), "Shinigami is here");
        assert_eq!(store.apply_to_text("REAPER!", Some(&view)), "SHINIGAMI!");
    }

    #[test]
    fn test_applyToText_shouldBeWholeWordOnly() {
        let (_dir, store) = store();

        let mut view = BTreeMap::new();
        view.insert("ken".to_string(), "Ken".to_string());

        // "ken" inside "kendo" must not be replaced
        let result = store.apply_to_text("o kendo de ken", Some(&view));
        assert_eq!(result, "o kendô de Ken");
    }

    #[test]
    fn test_applyToText_isIdempotentForPresentTerms() {
        let (_dir, store) = store();

        let mut view = BTreeMap::new();
        view.insert("reaper".to_string(), "shinigami".to_string());

        let once = store.apply_to_text("The reaper awaits", Some(&view));
        let twice = store.apply_to_text(&once, Some(&view));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_applyToText_seriesOverridesGlobal() {
        let (_dir, store) = store();

        // Global maps baka -> idiota; the series pins "baka" untouched
        let mut view = BTreeMap::new();
        view.insert("baka".to_string(), "baka".to_string());

        assert_eq!(store.apply_to_text("baka!", Some(&view)), "baka!");
        assert_eq!(store.apply_to_text("baka!", None), "idiota!");
    }

    #[test]
    fn test_parsePrescanResponse_jsonObject() {
        let response = r#"Here are the terms: {"Akane": "Akane", "Tokyo Tower": "Tokyo Tower"}"#;
        let parsed = parse_prescan_response(response);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["akane"], "Akane");
        assert_eq!(parsed["tokyo tower"], "Tokyo Tower");
    }

    #[test]
    fn test_parsePrescanResponse_lineFallback() {
        let response = "Akane -> Akane\n\"Hikari\": \"Hikari\"\nTokyo → Tokyo\nnoise line";
        let parsed = parse_prescan_response(response);

        assert_eq!(parsed["akane"], "Akane");
        assert_eq!(parsed["hikari"], "Hikari");
        assert_eq!(parsed["tokyo"], "Tokyo");
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_parsePrescanResponse_garbage_shouldBeEmpty() {
        assert!(parse_prescan_response("no structure at all").is_empty());
        assert!(parse_prescan_response("").is_empty());
    }
}
