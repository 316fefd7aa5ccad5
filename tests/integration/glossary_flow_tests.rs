/*!
 * Glossary behavior through the pipeline: LLM pre-scan, term enforcement
 * and automatic learning.
 */

use subtran::glossary::TermSource;

use crate::common::TestHarness;

#[tokio::test]
async fn test_prescan_shouldSeedGlossaryOnFirstEpisode() {
    let harness = TestHarness::new();

    // The pre-scan request is the first backend call; answer it with the
    // proper-noun JSON, then let per-line calls use defaults
    harness.backend.script_next(r#"{"Akane": "Akane"}"#);

    let lines: Vec<String> = (0..8).map(|i| format!("Akane said thing number {}.", i)).collect();
    let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let input = harness.write_srt("ep1.srt", &refs);

    harness.orchestrator.translate_file(&input, Some(42), None).await.unwrap();

    let doc = harness.glossary.load(42).expect("glossary document");
    assert_eq!(doc.terms["akane"].source, TermSource::LlmPrescan);
    assert_eq!(doc.terms["akane"].count, 1);
    assert!(doc.episodes_scanned >= 1);
}

#[tokio::test]
async fn test_prescan_shouldRunOnlyOncePerSeries() {
    let harness = TestHarness::new();
    harness.backend.script_next(r#"{"Akane": "Akane"}"#);

    let input = harness.write_srt("ep1.srt", &["Akane is here today."]);
    harness.orchestrator.translate_file(&input, Some(7), None).await.unwrap();
    let calls_after_first = harness.backend.call_count();

    // Second episode: episodes_scanned > 0, so no pre-scan call
    let input2 = harness.write_srt("ep2.srt", &["Akane is gone now."]);
    harness.orchestrator.translate_file(&input2, Some(7), None).await.unwrap();

    // Exactly one extra call for the new dialogue line
    assert_eq!(harness.backend.call_count(), calls_after_first + 1);
}

#[tokio::test]
async fn test_autoGlossary_shouldLearnRecurringProperNouns() {
    let harness = TestHarness::new();
    // Default mock replies keep capitalized words verbatim ("[PT] ...")
    harness.backend.script_next("{}");

    let lines = [
        "Hikari opened the door.",
        "Hikari looked around slowly.",
        "Everyone waited for Hikari.",
        "Something else entirely here.",
    ];
    let input = harness.write_srt("learn.srt", &lines);
    harness.orchestrator.translate_file(&input, Some(9), None).await.unwrap();

    let doc = harness.glossary.load(9).expect("glossary document");
    let term = doc.terms.get("hikari").expect("learned term");
    assert_eq!(term.source, TermSource::AutoTrack);
    assert_eq!(term.value, "Hikari");
    assert!(term.count >= 3);
}

#[tokio::test]
async fn test_glossaryEnforcement_shouldRewriteTranslations() {
    let harness = TestHarness::new();
    harness.backend.script_next(r#"{"Shinigami Ryuk": "Shinigami Ryuk"}"#);
    // The model translated the global term "reaper"; the glossary pass
    // swaps it back to shinigami
    harness.backend.respond("The reaper appeared.", "O reaper apareceu.");

    let input = harness.write_srt("enforce.srt", &["The reaper appeared."]);
    let outcome = harness.orchestrator.translate_file(&input, Some(3), None).await.unwrap();

    let output = std::fs::read_to_string(outcome.output.unwrap()).unwrap();
    assert!(output.contains("shinigami"), "got: {}", output);
}
