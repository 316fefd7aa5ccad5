/*!
 * Translation caching functionality.
 *
 * This module provides a two-tier caching system for translations:
 * - Memory tier: LRU map for fast access during the current session
 * - Disk tier: SQLite store for cross-session persistence
 *
 * Entries are keyed by two md5 hashes: a v1 key over the normalized text
 * and language pair, and a v2 contextual key that also folds in the
 * neighboring cues so homographic lines get distinct translations. Reads
 * probe v2 first and promote v1 hits into v2.
 */

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::errors::CacheError;

/// Minimum normalized text length worth caching
const MIN_TEXT_LEN: usize = 3;

/// Disk timestamp format, UTC, comparable lexicographically
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One cached translation held in the memory tier
#[derive(Debug, Clone)]
struct MemoryEntry {
    original_text: String,
    translated_text: String,
    source_lang: String,
    target_lang: String,
    api_used: String,
    hit_count: u64,
    last_accessed: i64,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Memory tier hits
    pub memory_hits: u64,
    /// Memory tier misses
    pub memory_misses: u64,
    /// Disk tier hits
    pub disk_hits: u64,
    /// Disk tier misses
    pub disk_misses: u64,
    /// Entries currently in the memory tier
    pub memory_entries: usize,
    /// Memory tier capacity
    pub memory_capacity: usize,
    /// Rows in the disk tier
    pub disk_entries: i64,
}

impl CacheStats {
    /// Overall hit rate in percent. Memory and disk miss counters move in
    /// lockstep (a full miss increments both), so misses are counted once.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.memory_misses;
        if total == 0 {
            return 0.0;
        }
        (hits as f64 / total as f64) * 100.0
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "Cache: memory {}/{} hits, disk {}/{} hits, {} entries in memory, {} on disk, {:.1}% overall",
            self.memory_hits,
            self.memory_hits + self.memory_misses,
            self.disk_hits,
            self.disk_hits + self.disk_misses,
            self.memory_entries,
            self.disk_entries,
            self.hit_rate()
        )
    }
}

struct CacheInner {
    memory: HashMap<String, MemoryEntry>,
    /// LRU order, least recently used first
    access_order: Vec<String>,
    capacity: usize,
    conn: Option<Connection>,
    memory_hits: u64,
    memory_misses: u64,
    disk_hits: u64,
    disk_misses: u64,
}

/// Two-tier context-aware translation cache.
///
/// Thread-safe: all state lives behind one mutex; reads and writes may be
/// issued from any thread. Disk failures degrade to memory-only operation.
pub struct TranslationCache {
    inner: Mutex<CacheInner>,
}

impl TranslationCache {
    /// Open or create the cache at `path`. Disk errors are logged and the
    /// cache starts memory-only rather than failing the run.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let capacity = memory_capacity_from_ram(installed_ram_gb());
        let conn = match Self::open_disk(path.as_ref()) {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Disk cache unavailable, continuing memory-only: {}", e);
                None
            }
        };

        info!(
            "Translation cache ready (memory capacity {}, disk {})",
            capacity,
            if conn.is_some() { "on" } else { "off" }
        );

        Self::build(conn, capacity)
    }

    /// In-memory SQLite cache, for tests
    pub fn new_in_memory() -> Self {
        let conn = Connection::open_in_memory().ok().map(|c| {
            init_schema(&c).expect("in-memory schema");
            c
        });
        Self::build(conn, 1000)
    }

    /// Cache with an explicit memory capacity, for tests
    pub fn with_capacity(capacity: usize) -> Self {
        let conn = Connection::open_in_memory().ok().map(|c| {
            init_schema(&c).expect("in-memory schema");
            c
        });
        Self::build(conn, capacity)
    }

    fn build(conn: Option<Connection>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                memory: HashMap::new(),
                access_order: Vec::new(),
                capacity,
                conn,
                memory_hits: 0,
                memory_misses: 0,
                disk_hits: 0,
                disk_misses: 0,
            }),
        }
    }

    fn open_disk(path: &Path) -> Result<Connection, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(conn)
    }

    /// Look up a translation. Probes the v2 contextual key first, then the
    /// v1 key; a v1 hit is synchronously promoted into v2 under the backend
    /// tag `v1_promoted`. Hit counters and last-accessed are bumped.
    pub fn get(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        prev_line: &str,
        next_line: &str,
    ) -> Option<String> {
        if text.trim().len() < MIN_TEXT_LEN {
            return None;
        }

        let hash_v2 = hash_v2(text, source_lang, target_lang, prev_line, next_line);
        let hash_v1 = hash_v1(text, source_lang, target_lang);

        let mut inner = self.inner.lock();

        for hash in [hash_v2.clone(), hash_v1.clone()] {
            // Memory tier first
            if inner.memory.contains_key(&hash) {
                let now = Utc::now().timestamp();
                let entry = inner.memory.get_mut(&hash).expect("checked above");
                entry.hit_count += 1;
                entry.last_accessed = now;
                let translated = entry.translated_text.clone();
                let entry_snapshot = entry.clone();

                inner.touch(&hash);
                inner.memory_hits += 1;
                inner.bump_disk_counters(&hash);
                debug!("Cache memory hit for '{}'", truncate(text, 40));

                if hash == hash_v1 && hash_v2 != hash_v1 && !inner.memory.contains_key(&hash_v2) {
                    inner.promote_to_v2(&hash_v2, &entry_snapshot);
                }

                return Some(translated);
            }

            // Disk tier
            if let Some(row) = inner.disk_lookup(&hash) {
                let entry = MemoryEntry {
                    original_text: row.0,
                    translated_text: row.1.clone(),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    api_used: "cached".to_string(),
                    hit_count: row.2 + 1,
                    last_accessed: Utc::now().timestamp(),
                };

                inner.memory.insert(hash.clone(), entry.clone());
                inner.touch(&hash);
                inner.evict_lru();
                inner.bump_disk_counters(&hash);
                inner.disk_hits += 1;
                debug!("Cache disk hit for '{}'", truncate(text, 40));

                if hash == hash_v1 && hash_v2 != hash_v1 {
                    inner.promote_to_v2(&hash_v2, &entry);
                }

                return Some(row.1);
            }
        }

        inner.memory_misses += 1;
        inner.disk_misses += 1;
        None
    }

    /// Store a translation under both keys. Refused when either string is
    /// empty, the normalized text is shorter than three characters, or the
    /// translation equals the original case-insensitively.
    pub fn set(
        &self,
        text: &str,
        translated: &str,
        source_lang: &str,
        target_lang: &str,
        api_used: &str,
        prev_line: &str,
        next_line: &str,
    ) {
        let original = text.trim();
        let translation = translated.trim();

        if original.is_empty() || translation.is_empty() || original.len() < MIN_TEXT_LEN {
            return;
        }
        if original.to_lowercase() == translation.to_lowercase() {
            return;
        }

        let hash_v1 = hash_v1(text, source_lang, target_lang);
        let hash_v2 = hash_v2(text, source_lang, target_lang, prev_line, next_line);

        let mut hashes = vec![hash_v1];
        if hash_v2 != hashes[0] {
            hashes.push(hash_v2);
        }

        let now = Utc::now().timestamp();
        let mut inner = self.inner.lock();

        for hash in &hashes {
            inner.memory.insert(
                hash.clone(),
                MemoryEntry {
                    original_text: original.to_string(),
                    translated_text: translation.to_string(),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    api_used: api_used.to_string(),
                    hit_count: 1,
                    last_accessed: now,
                },
            );
            let hash = hash.clone();
            inner.touch(&hash);
        }
        inner.evict_lru();

        if let Some(ref mut conn) = inner.conn {
            let result = (|| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for hash in &hashes {
                    tx.execute(
                        "INSERT OR REPLACE INTO translations \
                         (text_hash, original_text, translated_text, source_lang, target_lang, api_used, created_at, hit_count, last_accessed) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?7)",
                        rusqlite::params![
                            hash,
                            original,
                            translation,
                            source_lang,
                            target_lang,
                            api_used,
                            Utc::now().format(TS_FORMAT).to_string(),
                        ],
                    )?;
                }
                tx.commit()
            })();
            if let Err(e) = result {
                warn!("Failed to persist cache entry: {}", e);
            }
        }
    }

    /// Remove disk entries created more than `days` ago. Returns the number
    /// of rows deleted.
    pub fn cleanup_old(&self, days: i64) -> usize {
        let cutoff = (Utc::now() - chrono::Duration::days(days))
            .format(TS_FORMAT)
            .to_string();

        let inner = self.inner.lock();
        let Some(ref conn) = inner.conn else { return 0 };

        match conn.execute("DELETE FROM translations WHERE created_at < ?1", [&cutoff]) {
            Ok(deleted) => {
                if deleted > 0 {
                    info!("Cache cleanup: {} old entries removed", deleted);
                }
                deleted
            }
            Err(e) => {
                warn!("Cache cleanup failed: {}", e);
                0
            }
        }
    }

    /// Remove entries whose original and translation normalize equal.
    /// Such rows predate the insert guard or were written by older builds.
    pub fn cleanup_bad(&self) -> usize {
        let mut inner = self.inner.lock();

        let bad_hashes: Vec<String> = match inner.conn {
            Some(ref conn) => {
                let mut stmt = match conn.prepare(
                    "SELECT text_hash FROM translations \
                     WHERE LOWER(TRIM(original_text)) = LOWER(TRIM(translated_text))",
                ) {
                    Ok(stmt) => stmt,
                    Err(e) => {
                        warn!("Cache bad-entry scan failed: {}", e);
                        return 0;
                    }
                };
                stmt.query_map([], |row| row.get(0))
                    .map(|rows| rows.filter_map(|r| r.ok()).collect())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        if let Some(ref conn) = inner.conn {
            if let Err(e) = conn.execute(
                "DELETE FROM translations \
                 WHERE LOWER(TRIM(original_text)) = LOWER(TRIM(translated_text))",
                [],
            ) {
                warn!("Cache bad-entry delete failed: {}", e);
                return 0;
            }
        }

        for hash in &bad_hashes {
            inner.memory.remove(hash);
            inner.access_order.retain(|h| h != hash);
        }

        if !bad_hashes.is_empty() {
            info!("Cache cleanup: {} identical translations removed", bad_hashes.len());
        }
        bad_hashes.len()
    }

    /// Drop every memory-tier entry and reset memory counters
    pub fn clear_memory(&self) {
        let mut inner = self.inner.lock();
        inner.memory.clear();
        inner.access_order.clear();
        inner.memory_hits = 0;
        inner.memory_misses = 0;
        debug!("Memory cache cleared");
    }

    /// Drop both tiers
    pub fn clear_all(&self) {
        {
            let inner = self.inner.lock();
            if let Some(ref conn) = inner.conn {
                if let Err(e) = conn.execute("DELETE FROM translations", []) {
                    warn!("Failed to clear disk cache: {}", e);
                }
            }
        }
        self.clear_memory();
        let mut inner = self.inner.lock();
        inner.disk_hits = 0;
        inner.disk_misses = 0;
    }

    /// Bad-entry sweep, 30-day age cleanup, then VACUUM
    pub fn optimize(&self) {
        let bad = self.cleanup_bad();
        let old = self.cleanup_old(30);

        let inner = self.inner.lock();
        if let Some(ref conn) = inner.conn {
            if let Err(e) = conn.execute("VACUUM", []) {
                warn!("Cache VACUUM failed: {}", e);
            }
        }
        info!("Cache optimize done: {} bad + {} old entries removed", bad, old);
    }

    /// Whether the disk tier is available
    pub fn has_disk(&self) -> bool {
        self.inner.lock().conn.is_some()
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();

        let disk_entries = inner
            .conn
            .as_ref()
            .and_then(|conn| {
                conn.query_row("SELECT COUNT(*) FROM translations", [], |row| row.get(0))
                    .ok()
            })
            .unwrap_or(0);

        CacheStats {
            memory_hits: inner.memory_hits,
            memory_misses: inner.memory_misses,
            disk_hits: inner.disk_hits,
            disk_misses: inner.disk_misses,
            memory_entries: inner.memory.len(),
            memory_capacity: inner.capacity,
            disk_entries,
        }
    }
}

impl CacheInner {
    /// Move a hash to the most-recently-used end
    fn touch(&mut self, hash: &str) {
        self.access_order.retain(|h| h != hash);
        self.access_order.push(hash.to_string());

        if self.access_order.len() > self.capacity * 2 {
            let skip = self.access_order.len() - self.capacity;
            self.access_order.drain(..skip);
        }
    }

    /// Evict least-recently-accessed entries down to capacity.
    /// Ties (entries missing from the order list) fall back to map order.
    fn evict_lru(&mut self) {
        while self.memory.len() > self.capacity {
            if let Some(lru) = self.access_order.first().cloned() {
                self.access_order.remove(0);
                if self.memory.remove(&lru).is_some() {
                    continue;
                }
            } else if let Some(any) = self.memory.keys().next().cloned() {
                self.memory.remove(&any);
            } else {
                break;
            }
        }
    }

    fn disk_lookup(&self, hash: &str) -> Option<(String, String, u64)> {
        let conn = self.conn.as_ref()?;
        conn.query_row(
            "SELECT original_text, translated_text, hit_count FROM translations WHERE text_hash = ?1",
            [hash],
            |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64)),
        )
        .ok()
    }

    /// Increment hit_count and last_accessed on disk for a hit
    fn bump_disk_counters(&self, hash: &str) {
        if let Some(ref conn) = self.conn {
            let _ = conn.execute(
                "UPDATE translations SET hit_count = hit_count + 1, last_accessed = ?1 WHERE text_hash = ?2",
                rusqlite::params![Utc::now().format(TS_FORMAT).to_string(), hash],
            );
        }
    }

    /// Write a v1 entry under its v2 key so future contextual probes hit
    fn promote_to_v2(&mut self, hash_v2: &str, entry: &MemoryEntry) {
        let promoted = MemoryEntry {
            api_used: "v1_promoted".to_string(),
            hit_count: 1,
            last_accessed: Utc::now().timestamp(),
            ..entry.clone()
        };

        self.memory.insert(hash_v2.to_string(), promoted.clone());
        self.touch(hash_v2);

        if let Some(ref conn) = self.conn {
            let result = conn.execute(
                "INSERT OR IGNORE INTO translations \
                 (text_hash, original_text, translated_text, source_lang, target_lang, api_used, created_at, hit_count, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'v1_promoted', ?6, 1, ?6)",
                rusqlite::params![
                    hash_v2,
                    promoted.original_text,
                    promoted.translated_text,
                    promoted.source_lang,
                    promoted.target_lang,
                    Utc::now().format(TS_FORMAT).to_string(),
                ],
            );
            if let Err(e) = result {
                debug!("Failed to promote v1 entry to disk: {}", e);
            }
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            text_hash TEXT PRIMARY KEY,
            original_text TEXT NOT NULL,
            translated_text TEXT NOT NULL,
            source_lang TEXT NOT NULL,
            target_lang TEXT NOT NULL,
            api_used TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            hit_count INTEGER DEFAULT 1,
            last_accessed TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_hash ON translations(text_hash);
        CREATE INDEX IF NOT EXISTS idx_langs ON translations(source_lang, target_lang);
        CREATE INDEX IF NOT EXISTS idx_accessed ON translations(last_accessed);
        "#,
    )
}

/// Collapse whitespace runs and lowercase, the shared key normalization
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// v1 key: md5 over normalized text and the language pair
pub fn hash_v1(text: &str, source_lang: &str, target_lang: &str) -> String {
    let content = format!("{}|{}|{}", normalize(text), source_lang, target_lang);
    format!("{:x}", md5::compute(content.as_bytes()))
}

/// v2 contextual key: neighbors participate so homographs stay distinct
pub fn hash_v2(
    text: &str,
    source_lang: &str,
    target_lang: &str,
    prev_line: &str,
    next_line: &str,
) -> String {
    let content = format!(
        "{}|{}|{}|{}|{}|v2",
        normalize(text),
        normalize(prev_line),
        normalize(next_line),
        source_lang,
        target_lang
    );
    format!("{:x}", md5::compute(content.as_bytes()))
}

/// Memory-tier capacity by installed RAM bucket
fn memory_capacity_from_ram(ram_gb: f64) -> usize {
    if ram_gb < 4.0 {
        1000
    } else if ram_gb < 8.0 {
        2500
    } else if ram_gb < 16.0 {
        5000
    } else if ram_gb < 32.0 {
        10000
    } else {
        20000
    }
}

/// Installed RAM in GB. Linux reads /proc/meminfo; elsewhere a mid-range
/// 8 GB is assumed rather than probing hardware.
fn installed_ram_gb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
            for line in meminfo.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    let kb: f64 = rest
                        .trim()
                        .trim_end_matches("kB")
                        .trim()
                        .parse()
                        .unwrap_or(0.0);
                    if kb > 0.0 {
                        return kb / (1024.0 * 1024.0);
                    }
                }
            }
        }
    }
    8.0
}

/// Truncate text for log lines
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}...", prefix)
    }
}
