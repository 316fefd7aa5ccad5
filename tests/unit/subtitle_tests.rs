/*!
 * Subtitle codec tests over the public document API.
 */

use subtran::subtitle::{SubtitleDocument, SubtitleFormat};

const SRT: &str = "1\n00:00:01,000 --> 00:00:04,000\n<i>Hello world</i>\n\n2\n00:00:05,000 --> 00:00:08,000\nSecond cue\nwith two lines\n\n";

const ASS: &str = "[Script Info]\nTitle: Sample\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,20\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:04.00,Default,,0,0,0,,{\\pos(400,570)}Positioned line\nDialogue: 0,0:00:05.00,0:00:08.00,Default,,0,0,0,,Plain line\n";

#[test]
fn test_document_srtRoundTrip_preservesBlockCount() {
    let doc = SubtitleDocument::parse_str(SRT).unwrap();
    assert_eq!(doc.format(), SubtitleFormat::Srt);
    assert_eq!(doc.entries().len(), 2);

    let plain: Vec<String> = doc.entries().iter().map(|e| e.plain_text.clone()).collect();
    let emitted = doc.emit(&plain).unwrap();

    let reparsed = SubtitleDocument::parse_str(&emitted).unwrap();
    assert_eq!(reparsed.entries().len(), 2);
    assert_eq!(reparsed.entries()[0].plain_text, "Hello world");
    assert_eq!(reparsed.entries()[1].start_time_ms, 5000);
}

#[test]
fn test_document_srtUntouchedCue_keepsRawTags() {
    let doc = SubtitleDocument::parse_str(SRT).unwrap();
    let plain: Vec<String> = doc.entries().iter().map(|e| e.plain_text.clone()).collect();

    let emitted = doc.emit(&plain).unwrap();
    assert!(emitted.contains("<i>Hello world</i>"));
}

#[test]
fn test_document_srtTranslatedCue_replacesText() {
    let doc = SubtitleDocument::parse_str(SRT).unwrap();
    let translated = vec!["Olá mundo".to_string(), "Segunda fala\ncom duas linhas".to_string()];

    let emitted = doc.emit(&translated).unwrap();
    assert!(emitted.contains("Olá mundo"));
    assert!(emitted.contains("Segunda fala\ncom duas linhas"));
    assert!(emitted.contains("00:00:01,000 --> 00:00:04,000"));
    assert!(!emitted.contains("Hello world"));
}

#[test]
fn test_document_assRoundTrip_preservesDialogueCount() {
    let doc = SubtitleDocument::parse_str(ASS).unwrap();
    assert_eq!(doc.format(), SubtitleFormat::Ass);
    assert_eq!(doc.entries().len(), 2);

    let plain: Vec<String> = doc.entries().iter().map(|e| e.plain_text.clone()).collect();
    let emitted = doc.emit(&plain).unwrap();

    // Untouched rows are byte-identical, sections preserved
    assert!(emitted.contains(r"{\pos(400,570)}Positioned line"));
    assert!(emitted.contains("[V4+ Styles]"));

    let reparsed = SubtitleDocument::parse_str(&emitted).unwrap();
    assert_eq!(reparsed.entries().len(), 2);
}

#[test]
fn test_document_assTranslation_reattachesOverrides() {
    let doc = SubtitleDocument::parse_str(ASS).unwrap();
    let translated = vec!["Fala posicionada".to_string(), "Fala simples".to_string()];

    let emitted = doc.emit(&translated).unwrap();
    assert!(emitted.contains(r"{\pos(400,570)}Fala posicionada"));
    assert!(emitted.contains("Fala simples"));
}

#[test]
fn test_document_entryMetadata() {
    let doc = SubtitleDocument::parse_str(ASS).unwrap();
    let entry = &doc.entries()[0];

    assert_eq!(entry.seq_num, 1);
    assert_eq!(entry.start_time_ms, 1000);
    assert_eq!(entry.end_time_ms, 4000);
    assert_eq!(entry.style.as_deref(), Some("Default"));
    assert_eq!(entry.plain_text, "Positioned line");
    assert_eq!(entry.duration_ms(), 3000);
}
