/*!
 * Cache tests against a real on-disk database file, exercising the
 * cross-process persistence the in-memory unit tests cannot.
 */

use subtran::cache::TranslationCache;

#[test]
fn test_cache_diskFile_shouldPersistAcrossInstances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
        let cache = TranslationCache::open(&path);
        cache.set("Hello there", "Olá", "en", "pt-BR", "local_llm", "", "");
    }

    // A fresh instance over the same file sees the entry
    let cache = TranslationCache::open(&path);
    let result = cache.get("Hello there", "en", "pt-BR", "", "");
    assert_eq!(result.as_deref(), Some("Olá"));
    assert_eq!(cache.stats().disk_hits, 1);
}

#[test]
fn test_cache_setGetLaw_holdsForArbitraryContexts() {
    let cache = TranslationCache::new_in_memory();

    let cases = [
        ("Plain line", "", ""),
        ("Plain line", "with prev", ""),
        ("Plain line", "with prev", "and next"),
        ("Another line", "", "only next"),
    ];

    for (i, (text, prev, next)) in cases.iter().enumerate() {
        let translated = format!("tradução {}", i);
        cache.set(text, &translated, "en", "pt-BR", "x", prev, next);
        assert_eq!(
            cache.get(text, "en", "pt-BR", prev, next).as_deref(),
            Some(translated.as_str()),
            "case {} failed",
            i
        );
    }
}

#[test]
fn test_cache_contextualEntries_shouldNotCollide() {
    let cache = TranslationCache::new_in_memory();

    cache.set("Right.", "Certo.", "en", "pt-BR", "x", "Is it true?", "");
    cache.set("Right.", "À direita.", "en", "pt-BR", "x", "Which way?", "");

    assert_eq!(
        cache.get("Right.", "en", "pt-BR", "Which way?", "").as_deref(),
        Some("À direita.")
    );
}

#[test]
fn test_cache_openOnBadPath_shouldDegradeToMemoryOnly() {
    // A directory that cannot be created forces memory-only operation
    let cache = TranslationCache::open("/proc/nope/cache.db");

    cache.set("Hello there", "Olá", "en", "pt-BR", "x", "", "");
    assert_eq!(cache.get("Hello there", "en", "pt-BR", "", "").as_deref(), Some("Olá"));
    assert_eq!(cache.stats().disk_entries, 0);
}
