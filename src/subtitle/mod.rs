/*!
 * Subtitle codec: parsing and emission of SRT and ASS files.
 *
 * The codec isolates translatable plain text from formatting so the
 * translation pipeline never sees override tags, and reconstructs the
 * original structure (timing, styles, inline tags) around translated text.
 */

pub mod srt;
pub mod ass;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SubtitleError;
use crate::file_utils::FileManager;

/// HTML-ish tags that appear in SRT text (<i>, <b>, <font ...>)
static HTML_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// ASS override blocks ({\i1}, {\pos(10,20)}, ...)
static OVERRIDE_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());

/// Subtitle file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    /// SubRip blocks
    Srt,
    /// Advanced SubStation Alpha events
    Ass,
}

impl SubtitleFormat {
    /// Canonical file extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Ass => "ass",
        }
    }
}

/// One subtitle cue. Immutable after extraction; owned by the running job.
#[derive(Debug, Clone)]
pub struct SubtitleEntry {
    /// SRT index, or ordinal of the Dialogue row for ASS
    pub seq_num: usize,

    /// Start time in milliseconds
    pub start_time_ms: u64,

    /// End time in milliseconds
    pub end_time_ms: u64,

    /// Style name for ASS dialogue rows
    pub style: Option<String>,

    /// Text as it appears in the file, tags included
    pub raw_text: String,

    /// Extracted plain text with tags stripped and entities decoded
    pub plain_text: String,
}

impl SubtitleEntry {
    /// Build an entry, deriving the plain text from the raw text
    pub fn new(
        seq_num: usize,
        start_time_ms: u64,
        end_time_ms: u64,
        style: Option<String>,
        raw_text: String,
    ) -> Self {
        let plain_text = strip_formatting(&raw_text);
        Self { seq_num, start_time_ms, end_time_ms, style, raw_text, plain_text }
    }

    /// Duration of this cue in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }
}

/// A parsed subtitle file that can be re-emitted with translated text
#[derive(Debug)]
pub struct SubtitleDocument {
    format: SubtitleFormat,
    entries: Vec<SubtitleEntry>,
    /// Full script for ASS, which must be preserved verbatim outside
    /// dialogue Text fields
    ass_script: Option<ass::AssScript>,
}

impl SubtitleDocument {
    /// Parse a subtitle file from disk. `.sub` (image-based) files are not
    /// handled here and surface as `FormatMismatch` so the caller can route
    /// them through the extraction collaborator.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, SubtitleError> {
        let path = path.as_ref();

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext == "sub" {
            return Err(SubtitleError::FormatMismatch(
                "image-based .sub requires extraction to SRT/ASS first".to_string(),
            ));
        }

        let (content, _encoding) = FileManager::read_subtitle(path)
            .map_err(|e| SubtitleError::Io(std::io::Error::other(e.to_string())))?;

        Self::parse_str(&content)
    }

    /// Parse subtitle content, detecting the format from the content itself
    pub fn parse_str(content: &str) -> Result<Self, SubtitleError> {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with("[Script Info]") || trimmed.starts_with("Dialogue:") {
            let script = ass::AssScript::parse(content)?;
            let entries = script.entries();
            Ok(Self { format: SubtitleFormat::Ass, entries, ass_script: Some(script) })
        } else {
            let entries = srt::parse(content)?;
            Ok(Self { format: SubtitleFormat::Srt, entries, ass_script: None })
        }
    }

    /// The detected format
    pub fn format(&self) -> SubtitleFormat {
        self.format
    }

    /// The extracted cues, in source order
    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    /// Emit the document with translated plain texts substituted in. The
    /// slice must be index-aligned with `entries()`; pass the original
    /// plain text for cues that were kept verbatim. Counts, timestamps,
    /// styles and inline override tags are preserved.
    pub fn emit(&self, translated_plain: &[String]) -> Result<String, SubtitleError> {
        if translated_plain.len() != self.entries.len() {
            return Err(SubtitleError::ParseError {
                line: 0,
                message: format!(
                    "translation count {} does not match cue count {}",
                    translated_plain.len(),
                    self.entries.len()
                ),
            });
        }

        match self.format {
            SubtitleFormat::Srt => Ok(srt::emit(&self.entries, translated_plain)),
            SubtitleFormat::Ass => {
                let script = self.ass_script.as_ref().expect("ASS document has a script");
                Ok(script.emit(&self.entries, translated_plain))
            }
        }
    }
}

/// Strip HTML tags and ASS override blocks, decode HTML entities
pub fn strip_formatting(raw: &str) -> String {
    let text = OVERRIDE_BLOCK_REGEX.replace_all(raw, "");
    let text = HTML_TAG_REGEX.replace_all(&text, "");
    decode_entities(&text).trim().to_string()
}

/// Reattach preserved override blocks, in original order, as a prefix of
/// the translated text. Without tags the translated text passes through.
pub fn replace_formatting(entry: &SubtitleEntry, new_plain: &str) -> String {
    let tags: Vec<&str> = OVERRIDE_BLOCK_REGEX
        .find_iter(&entry.raw_text)
        .map(|m| m.as_str())
        .collect();
    if tags.is_empty() {
        return new_plain.to_string();
    }
    format!("{}{}", tags.concat(), new_plain)
}

/// Decode the HTML entities that show up in subtitle rips
pub fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
