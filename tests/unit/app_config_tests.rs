/*!
 * Configuration loading and validation tests.
 */

use subtran::app_config::{BackendKind, Config};

#[test]
fn test_config_jsonRoundTrip_shouldPreserveFields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default_config();
    config.target_lang = "es".to_string();
    config.backend.kind = BackendKind::Libretranslate;
    config.backend.base_url = "http://translate.local:5000".to_string();
    config.translation.srt_batch_size = 8;
    config.translation.context_window_size = 3;
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.target_lang, "es");
    assert_eq!(loaded.backend.kind, BackendKind::Libretranslate);
    assert_eq!(loaded.backend.base_url, "http://translate.local:5000");
    assert_eq!(loaded.translation.srt_batch_size, 8);
    assert_eq!(loaded.translation.context_window_size, 3);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_partialJson_shouldFillDefaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, r#"{"target_lang": "fr"}"#).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.target_lang, "fr");
    assert_eq!(loaded.source_lang, "auto");
    assert_eq!(loaded.max_parallelism, 1);
    assert_eq!(loaded.translation.ass_batch_size, 2);
    assert!(loaded.translation.enable_fewshot);
    assert!(!loaded.translation.enable_batch_mode);
}

#[test]
fn test_config_contextWindowBounds() {
    let mut config = Config::default_config();

    config.translation.context_window_size = 10;
    assert!(config.validate().is_ok());

    config.translation.context_window_size = 11;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_missingFile_shouldError() {
    assert!(Config::from_file("/nonexistent/conf.json").is_err());
}
