/*!
 * ASS/SSA parsing and emission.
 *
 * Section headers, styles and script metadata are preserved verbatim; only
 * the Text field of `Dialogue:` rows is rewritten. A dialogue row is
 * `Dialogue: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text`
 * with up to nine commas before Text, which may itself contain commas.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::{SubtitleEntry, replace_formatting};
use crate::errors::SubtitleError;

/// ASS timestamps look like `H:MM:SS.cc` (centiseconds)
static ASS_TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d{2}):(\d{2})\.(\d{2})$").unwrap());

/// A parsed ASS script: every line of the original file plus the location
/// and decomposition of each dialogue row.
#[derive(Debug)]
pub struct AssScript {
    lines: Vec<String>,
    dialogues: Vec<DialogueRow>,
}

/// One `Dialogue:` row, split into the fixed prefix (first nine fields,
/// kept verbatim) and the Text field.
#[derive(Debug)]
struct DialogueRow {
    /// Index into `lines`
    line_idx: usize,
    /// `Dialogue: Layer,Start,End,Style,Name,ML,MR,MV,Effect` - unmodified
    prefix: String,
    /// The Text field as found in the file
    text: String,
    start_ms: u64,
    end_ms: u64,
    style: String,
}

impl AssScript {
    /// Parse an ASS script, collecting dialogue rows
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
        let mut dialogues = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let Some(rest) = line.strip_prefix("Dialogue:") else { continue };

            // Nine commas split off the fixed fields; Text keeps its commas
            let fields: Vec<&str> = rest.splitn(10, ',').collect();
            if fields.len() < 10 {
                return Err(SubtitleError::ParseError {
                    line: idx + 1,
                    message: format!("dialogue row has {} fields, expected 10", fields.len()),
                });
            }

            let start_ms = parse_timestamp(fields[1].trim()).ok_or_else(|| {
                SubtitleError::ParseError {
                    line: idx + 1,
                    message: format!("malformed start time: {}", fields[1]),
                }
            })?;
            let end_ms = parse_timestamp(fields[2].trim()).ok_or_else(|| {
                SubtitleError::ParseError {
                    line: idx + 1,
                    message: format!("malformed end time: {}", fields[2]),
                }
            })?;

            let text = fields[9].to_string();
            let prefix_len = rest.len() - text.len();
            let prefix = format!("Dialogue:{}", &rest[..prefix_len]);

            dialogues.push(DialogueRow {
                line_idx: idx,
                prefix,
                text,
                start_ms,
                end_ms,
                style: fields[3].trim().to_string(),
            });
        }

        Ok(Self { lines, dialogues })
    }

    /// Extract dialogue rows as subtitle entries, in file order
    pub fn entries(&self) -> Vec<SubtitleEntry> {
        self.dialogues
            .iter()
            .enumerate()
            .map(|(ordinal, row)| {
                SubtitleEntry::new(
                    ordinal + 1,
                    row.start_ms,
                    row.end_ms,
                    Some(row.style.clone()),
                    row.text.clone(),
                )
            })
            .collect()
    }

    /// Emit the script with translated plain texts substituted into the
    /// Text field of each dialogue row. Everything else is byte-preserved.
    pub fn emit(&self, entries: &[SubtitleEntry], translated_plain: &[String]) -> String {
        let mut lines = self.lines.clone();

        for ((row, entry), new_plain) in self.dialogues.iter().zip(entries).zip(translated_plain) {
            // Untouched rows keep their original Text field byte-for-byte
            if *new_plain == entry.plain_text {
                continue;
            }
            lines[row.line_idx] = format!("{}{}", row.prefix, replace_formatting(entry, new_plain));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Number of dialogue rows in the script
    pub fn dialogue_count(&self) -> usize {
        self.dialogues.len()
    }
}

/// Parse `H:MM:SS.cc` into milliseconds
pub fn parse_timestamp(timestamp: &str) -> Option<u64> {
    let caps = ASS_TIME_REGEX.captures(timestamp)?;
    let field = |i: usize| -> u64 { caps.get(i).map_or(0, |m| m.as_str().parse().unwrap_or(0)) };
    Some((field(1) * 3600 + field(2) * 60 + field(3)) * 1000 + field(4) * 10)
}

/// Format milliseconds as `H:MM:SS.cc`
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let centis = (ms % 1_000) / 10;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[Script Info]\nTitle: Sample\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,20\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:04.00,Default,,0,0,0,,{\\i1}Hello{\\i0}\nDialogue: 0,0:00:05.50,0:00:08.00,Default,,0,0,0,,Nice, isn't it?\n";

    #[test]
    fn test_parse_shouldCollectDialogueRows() {
        let script = AssScript::parse(SAMPLE).unwrap();
        assert_eq!(script.dialogue_count(), 2);

        let entries = script.entries();
        assert_eq!(entries[0].plain_text, "Hello");
        assert_eq!(entries[0].style.as_deref(), Some("Default"));
        assert_eq!(entries[0].start_time_ms, 1000);
        assert_eq!(entries[0].end_time_ms, 4000);
        // Text field commas belong to the text
        assert_eq!(entries[1].plain_text, "Nice, isn't it?");
        assert_eq!(entries[1].start_time_ms, 5500);
    }

    #[test]
    fn test_parse_malformedTime_shouldFail() {
        let bad = "[Events]\nDialogue: 0,0:00:zz.00,0:00:04.00,Default,,0,0,0,,Hi\n";
        assert!(matches!(
            AssScript::parse(bad),
            Err(SubtitleError::ParseError { line: 2, .. })
        ));
    }

    #[test]
    fn test_emit_shouldPreserveSectionsAndTags() {
        let script = AssScript::parse(SAMPLE).unwrap();
        let entries = script.entries();

        let emitted = script.emit(&entries, &["Olá".to_string(), "Legal, né?".to_string()]);

        assert!(emitted.contains("[Script Info]"));
        assert!(emitted.contains("[V4+ Styles]"));
        assert!(emitted.contains("Style: Default,Arial,20"));
        assert!(emitted.contains(r"{\i1}{\i0}Olá"));
        assert!(emitted.contains("Legal, né?"));
        assert!(!emitted.contains("Hello"));
    }

    #[test]
    fn test_emit_roundTrip_shouldKeepDialogueCount() {
        let script = AssScript::parse(SAMPLE).unwrap();
        let entries = script.entries();
        let plain: Vec<String> = entries.iter().map(|e| e.plain_text.clone()).collect();

        let emitted = script.emit(&entries, &plain);
        let reparsed = AssScript::parse(&emitted).unwrap();

        assert_eq!(reparsed.dialogue_count(), script.dialogue_count());
    }

    #[test]
    fn test_timestamps_roundTrip() {
        assert_eq!(parse_timestamp("0:00:01.00"), Some(1000));
        assert_eq!(parse_timestamp("1:23:45.67"), Some(5025670));
        assert_eq!(format_timestamp(5025670), "1:23:45.67");
        assert_eq!(parse_timestamp("bad"), None);
    }
}
