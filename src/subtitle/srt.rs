/*!
 * SRT (SubRip) parsing and emission.
 *
 * Blocks are separated by blank lines: a decimal index line, a time range
 * line `HH:MM:SS,mmm --> HH:MM:SS,mmm`, then one or more text lines.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::{SubtitleEntry, replace_formatting};
use crate::errors::SubtitleError;

/// Regex for parsing SRT time range lines
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})$")
        .unwrap()
});

/// Parse SRT content into subtitle entries
pub fn parse(content: &str) -> Result<Vec<SubtitleEntry>, SubtitleError> {
    let mut entries = Vec::new();

    // State for the block being assembled
    let mut seq_num: Option<usize> = None;
    let mut times: Option<(u64, u64)> = None;
    let mut text = String::new();

    let mut flush = |seq: &mut Option<usize>, times: &mut Option<(u64, u64)>, text: &mut String| {
        if let (Some(num), Some((start, end))) = (seq.take(), times.take()) {
            if !text.trim().is_empty() {
                entries.push(SubtitleEntry::new(num, start, end, None, text.trim_end().to_string()));
            }
        }
        text.clear();
    };

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut seq_num, &mut times, &mut text);
            continue;
        }

        // Index line opens a new block
        if seq_num.is_none() && text.is_empty() {
            if let Ok(num) = trimmed.parse::<usize>() {
                seq_num = Some(num);
                continue;
            }
        }

        // A time range must follow the index
        if seq_num.is_some() && times.is_none() {
            let caps = TIMESTAMP_REGEX.captures(trimmed).ok_or_else(|| {
                SubtitleError::ParseError {
                    line: line_no + 1,
                    message: format!("malformed timestamp line: {}", trimmed),
                }
            })?;
            let start = timestamp_ms(&caps, 1);
            let end = timestamp_ms(&caps, 5);
            times = Some((start, end));
            continue;
        }

        if seq_num.is_some() && times.is_some() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(trimmed);
        }
        // Text before any index line is tolerated noise (BOM debris, comments)
    }

    flush(&mut seq_num, &mut times, &mut text);

    Ok(entries)
}

/// Emit SRT content from the original entries and index-aligned translated
/// plain texts, preserving indexes, timestamps and inline tags.
pub fn emit(entries: &[SubtitleEntry], translated_plain: &[String]) -> String {
    let mut out = String::new();

    for (entry, new_plain) in entries.iter().zip(translated_plain) {
        out.push_str(&entry.seq_num.to_string());
        out.push('\n');
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(entry.start_time_ms),
            format_timestamp(entry.end_time_ms)
        ));
        // Untouched cues keep their raw text byte-for-byte
        if *new_plain == entry.plain_text {
            out.push_str(&entry.raw_text);
        } else {
            out.push_str(&replace_formatting(entry, new_plain));
        }
        out.push_str("\n\n");
    }

    out
}

/// Format a timestamp in milliseconds as `HH:MM:SS,mmm`
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

fn timestamp_ms(caps: &regex::Captures, start_idx: usize) -> u64 {
    let field = |i: usize| -> u64 {
        caps.get(start_idx + i)
            .map_or(0, |m| m.as_str().parse().unwrap_or(0))
    };
    (field(0) * 3600 + field(1) * 60 + field(2)) * 1000 + field(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:04,000\nHello world\n\n2\n00:00:05,000 --> 00:00:08,000\nTest subtitle\nSecond line\n\n";

    #[test]
    fn test_parse_shouldReadBlocks() {
        let entries = parse(SAMPLE).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq_num, 1);
        assert_eq!(entries[0].start_time_ms, 1000);
        assert_eq!(entries[0].end_time_ms, 4000);
        assert_eq!(entries[0].plain_text, "Hello world");
        assert_eq!(entries[1].plain_text, "Test subtitle\nSecond line");
    }

    #[test]
    fn test_parse_malformedTimestamp_shouldFail() {
        let bad = "1\n00:00:xx,000 --> 00:00:04,000\nHello\n";
        let result = parse(bad);
        assert!(matches!(result, Err(SubtitleError::ParseError { line: 2, .. })));
    }

    #[test]
    fn test_parse_htmlTags_shouldProducePlainText() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\n<i>Whispering</i>\n";
        let entries = parse(content).unwrap();
        assert_eq!(entries[0].raw_text, "<i>Whispering</i>");
        assert_eq!(entries[0].plain_text, "Whispering");
    }

    #[test]
    fn test_emit_roundTrip_shouldPreserveStructure() {
        let entries = parse(SAMPLE).unwrap();
        let plain: Vec<String> = entries.iter().map(|e| e.plain_text.clone()).collect();

        let emitted = emit(&entries, &plain);
        let reparsed = parse(&emitted).unwrap();

        assert_eq!(reparsed.len(), entries.len());
        for (a, b) in entries.iter().zip(&reparsed) {
            assert_eq!(a.seq_num, b.seq_num);
            assert_eq!(a.start_time_ms, b.start_time_ms);
            assert_eq!(a.end_time_ms, b.end_time_ms);
            assert_eq!(a.plain_text, b.plain_text);
        }
    }

    #[test]
    fn test_emit_withTranslations_shouldSubstituteText() {
        let entries = parse("1\n00:00:01,000 --> 00:00:02,000\nShit!\n").unwrap();
        let emitted = emit(&entries, &["Merda!".to_string()]);

        assert!(emitted.contains("Merda!"));
        assert!(emitted.contains("00:00:01,000 --> 00:00:02,000"));
        assert!(!emitted.contains("Shit!"));
    }

    #[test]
    fn test_formatTimestamp_shouldZeroPad() {
        assert_eq!(format_timestamp(5025678), "01:23:45,678");
        assert_eq!(format_timestamp(0), "00:00:00,000");
    }

    #[test]
    fn test_parse_emptyContent_shouldReturnNoEntries() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n\n").unwrap().is_empty());
    }
}
