/*!
 * End-to-end pipeline scenarios against the mock backend.
 */

use subtran::app_config::Config;
use subtran::backends::mock::{MockBackend, MockFailure};
use subtran::errors::AppError;

use crate::common::TestHarness;

#[tokio::test]
async fn test_pipeline_dedupe_shouldTranslateDuplicatesOnce() {
    let harness = TestHarness::new();
    harness.backend.respond("Let's go.", "Vamos.");

    let input = harness.write_srt("ep1.srt", &["Shit!", "Let's go.", "Shit!"]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    // "Shit!" is a built-in simple phrase; only "Let's go." hits the backend
    assert_eq!(harness.backend.call_count(), 1);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    let lines: Vec<&str> = output.lines().filter(|l| !l.is_empty()).collect();
    assert!(output.contains("Merda!"));
    assert!(output.contains("Vamos."));
    assert_eq!(output.matches("Merda!").count(), 2);
    assert!(!output.contains("Shit!"));
    assert!(lines.iter().any(|l| *l == "1"));

    // Dedupe bookkeeping: three successes, one in-file hit
    assert_eq!(outcome.stats.successful_translations, 3);
    assert_eq!(outcome.stats.cache_hits, 1);

    // One new logical cache entry: the backend-translated line only
    assert_eq!(
        harness.cache.get("Let's go.", "en", "pt-BR", "Shit!", "Shit!").as_deref(),
        Some("Vamos.")
    );
    assert!(harness.cache.get("Shit!", "en", "pt-BR", "", "Let's go.").is_none());
}

#[tokio::test]
async fn test_pipeline_soundEffect_shouldBypassBackend() {
    let harness = TestHarness::new();

    let input = harness.write_srt("sfx.srt", &["[door creaking]"]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(harness.backend.call_count(), 0);
    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("[porta rangendo]"));
    assert_eq!(outcome.stats.classified_sfx, 1);
}

#[tokio::test]
async fn test_pipeline_assOverrides_shouldSeePlainTextAndReattachTags() {
    let harness = TestHarness::new();
    harness.backend.respond("Hello", "Olá");

    let input = harness.write_ass("ep1.ass", &[r"{\i1}Hello{\i0}", r"{\an8\blur2}"]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    // The exact-match lookup firing proves the prompt carried bare "Hello";
    // the pure override row never reaches the backend
    assert_eq!(harness.backend.call_count(), 1);
    assert_eq!(outcome.stats.classified_tag, 1);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains(r"{\i1}{\i0}Olá"), "got: {}", output);
    // Technical tag rows come out byte-for-byte
    assert!(output.contains(r",,{\an8\blur2}"));
    assert!(output.contains("[Script Info]"));
    assert!(output.contains("Style: Default,Arial,20"));
}

#[tokio::test]
async fn test_pipeline_pronouns_shouldPassValidationAndCache() {
    let harness = TestHarness::new();
    harness.backend.respond("She is a doctor.", "Ela é médica.");
    harness.backend.respond("He is a doctor.", "Ele é médico.");

    let input = harness.write_srt("doc.srt", &["She is a doctor.", "He is a doctor."]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(outcome.stats.successful_translations, 2);
    assert_eq!(outcome.stats.validation_rejections, 0);

    assert_eq!(
        harness.cache.get("She is a doctor.", "en", "pt-BR", "", "He is a doctor.").as_deref(),
        Some("Ela é médica.")
    );
    assert_eq!(
        harness.cache.get("He is a doctor.", "en", "pt-BR", "She is a doctor.", "").as_deref(),
        Some("Ele é médico.")
    );
}

#[tokio::test]
async fn test_pipeline_semanticInversion_shouldRetryAndKeepOriginal() {
    let harness = TestHarness::new();
    // Inversion plus an artifact prefix drives confidence below the floor;
    // the self-consistency retry returns the same bad output
    harness.backend.respond("I don't know.", "Note: Eu sei.");

    let input = harness.write_srt("inv.srt", &["I don't know."]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(outcome.stats.self_consistency_triggered, 1);
    assert_eq!(outcome.stats.validation_rejections, 1);
    assert_eq!(outcome.stats.successful_translations, 0);

    // Original kept verbatim, nothing cached
    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("I don't know."));
    assert!(harness.cache.get("I don't know.", "en", "pt-BR", "", "").is_none());
}

#[tokio::test]
async fn test_pipeline_selfConsistency_shouldPreferConciseRetry() {
    let harness = TestHarness::new();
    // First answer rambles (low confidence via inversion), retry is short
    // and over 20% shorter, so the retry wins
    harness.backend.script_next("Eu realmente acho que sei de tudo isso agora");
    harness.backend.script_next("Eu não sei.");

    let input = harness.write_srt("sc.srt", &["I don't know."]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(outcome.stats.self_consistency_triggered, 1);
    assert_eq!(outcome.stats.successful_translations, 1);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("Eu não sei."), "got: {}", output);
}

#[tokio::test]
async fn test_pipeline_emptyFile_shouldEmitEmptyOutput() {
    let harness = TestHarness::new();

    let path = harness.dir.path().join("empty.srt");
    std::fs::write(&path, "").unwrap();

    let outcome = harness.orchestrator.translate_file(&path, None, None).await.unwrap();

    assert_eq!(harness.backend.call_count(), 0);
    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_pipeline_allMusic_shouldCopyInputWithoutBackendCalls() {
    let harness = TestHarness::new();

    let input = harness.write_srt("music.srt", &["♪ la la la ♪", "♪ oh oh ♪"]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(harness.backend.call_count(), 0);
    assert_eq!(outcome.stats.classified_music, 2);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("♪ la la la ♪"));
    assert!(output.contains("♪ oh oh ♪"));
}

#[tokio::test]
async fn test_pipeline_timeoutEveryCall_shouldKeepAllLines() {
    let harness = TestHarness::with_backend_and_config(
        MockBackend::failing(MockFailure::Timeout),
        Config::default_config(),
    );

    let input = harness.write_srt(
        "timeout.srt",
        &["First unique line.", "Second unique line.", "Third unique line."],
    );
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(outcome.stats.api_failures, 3);
    assert_eq!(outcome.stats.successful_translations, 0);

    // Output equals input, line for line
    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("First unique line."));
    assert!(output.contains("Second unique line."));
    assert!(output.contains("Third unique line."));
}

#[tokio::test]
async fn test_pipeline_quotaExhaustion_shouldBenchBackendForRun() {
    let harness = TestHarness::with_backend_and_config(
        MockBackend::failing(MockFailure::Quota),
        Config::default_config(),
    );

    let input = harness.write_srt("quota.srt", &["Line one here.", "Line two here."]);
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    // First call trips the quota ledger; the second line never reaches
    // the backend
    assert_eq!(harness.backend.call_count(), 1);
    assert_eq!(outcome.stats.api_failures, 2);
}

#[tokio::test]
async fn test_pipeline_skipExisting_shouldMakeZeroBackendCalls() {
    let harness = TestHarness::new();
    harness.backend.respond("Hello there.", "Olá.");

    let input = harness.write_srt("skip.srt", &["Hello there."]);
    let first = harness.orchestrator.translate_file(&input, None, None).await.unwrap();
    assert!(!first.skipped);
    assert_eq!(harness.backend.call_count(), 1);

    let second = harness.orchestrator.translate_file(&input, None, None).await.unwrap();
    assert!(second.skipped);
    assert_eq!(harness.backend.call_count(), 1);
}

#[tokio::test]
async fn test_pipeline_cancellation_shouldLeaveOutputUnwritten() {
    let harness = TestHarness::new();
    harness.token.cancel();

    let input = harness.write_srt("cancel.srt", &["Hello there."]);
    let result = harness.orchestrator.translate_file(&input, None, None).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    let output = input.with_file_name("cancel.pt-BR.srt");
    assert!(!output.exists());
}

#[tokio::test]
async fn test_pipeline_formatMismatch_shouldFailFile() {
    let harness = TestHarness::new();

    let path = harness.dir.path().join("old.sub");
    std::fs::write(&path, "binary blob").unwrap();

    let result = harness.orchestrator.translate_file(&path, None, None).await;
    assert!(matches!(result, Err(AppError::Subtitle(_))));
}

#[tokio::test]
async fn test_pipeline_batchMode_shouldTranslateInOneCall() {
    let mut config = Config::default_config();
    config.translation.enable_batch_mode = true;
    config.translation.srt_batch_size = 4;

    let harness = TestHarness::with_backend_and_config(MockBackend::working(), config);
    harness.backend.script_batch(
        "1\u{2502} Linha um\n2\u{2502} Linha dois\n3\u{2502} Linha três\n4\u{2502} Linha quatro",
    );

    let input = harness.write_srt(
        "batch.srt",
        &["Line one text.", "Line two text.", "Line three text.", "Line four text."],
    );
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(harness.backend.batch_call_count(), 1);
    assert_eq!(harness.backend.call_count(), 0);
    assert_eq!(outcome.stats.successful_translations, 4);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("Linha um"));
    assert!(output.contains("Linha quatro"));
}

#[tokio::test]
async fn test_pipeline_batchFailure_shouldFallBackLineByLine() {
    let mut config = Config::default_config();
    config.translation.enable_batch_mode = true;
    config.translation.srt_batch_size = 4;

    let harness = TestHarness::with_backend_and_config(MockBackend::working(), config);
    // No scripted batch reply: the batch parse fails and every line falls
    // back to an individual request

    let input = harness.write_srt(
        "fallback.srt",
        &["Alpha line text.", "Beta line text.", "Gamma line text.", "Delta line text."],
    );
    let outcome = harness.orchestrator.translate_file(&input, None, None).await.unwrap();

    assert_eq!(harness.backend.batch_call_count(), 1);
    assert_eq!(harness.backend.call_count(), 4);
    assert_eq!(outcome.stats.successful_translations, 4);
}

#[tokio::test]
async fn test_pipeline_run_shouldProcessMultipleFiles() {
    let harness = TestHarness::new();
    harness.backend.respond("Hello there.", "Olá.");
    harness.backend.respond("Good morning.", "Bom dia.");

    let a = harness.write_srt("a.srt", &["Hello there."]);
    let b = harness.write_srt("b.srt", &["Good morning."]);

    let outcomes = harness
        .orchestrator
        .run(vec![(a, None, None), (b, None, None)])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_ok()));
}

#[tokio::test]
async fn test_pipeline_cacheHit_shouldSkipBackendOnSecondFile() {
    let harness = TestHarness::new();
    harness.backend.respond("Hello there.", "Olá.");

    let first = harness.write_srt("c1.srt", &["Hello there."]);
    harness.orchestrator.translate_file(&first, None, None).await.unwrap();
    assert_eq!(harness.backend.call_count(), 1);

    // Same line in a different file: served from the cache
    let second = harness.write_srt("c2.srt", &["Hello there."]);
    let outcome = harness.orchestrator.translate_file(&second, None, None).await.unwrap();

    assert_eq!(harness.backend.call_count(), 1);
    assert_eq!(outcome.stats.cache_hits, 1);

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("Olá."));
}
