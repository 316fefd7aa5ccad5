use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// This module provides functions for validating, normalizing, and
/// matching ISO 639-1 (2-letter) and ISO 639-2 (3-letter) language codes,
/// plus locale-aware display names for prompt text (pt-BR, pt-PT, ...).

/// Language code type
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
    /// Unknown or invalid code
    #[allow(dead_code)]
    Unknown,
}

/// ISO 639-2/B codes that differ from their 639-2/T equivalents.
/// isolang only speaks 639-2/T, so these are mapped by hand.
const PART2B_TO_PART2T: [(&str, &str); 18] = [
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

/// Strip a region subtag: "pt-BR" -> "pt", "en_US" -> "en"
pub fn base_code(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code.
/// Locale codes are validated on their base subtag.
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let normalized = base_code(code);

    if normalized.len() == 2 {
        if Language::from_639_1(&normalized).is_some() {
            return Ok(LanguageCodeType::Part1);
        }
    } else if normalized.len() == 3 {
        if Language::from_639_3(&normalized).is_some() {
            return Ok(LanguageCodeType::Part2T);
        }
        if part2b_to_part2t(&normalized).is_some() {
            return Ok(LanguageCodeType::Part2B);
        }
    }

    Err(anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized = base_code(code);

    if normalized.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized) {
            return Ok(lang.to_639_3().to_string());
        }
    } else if normalized.len() == 3 {
        if Language::from_639_3(&normalized).is_some() {
            return Ok(normalized);
        }
        if let Some(part2t) = part2b_to_part2t(&normalized) {
            return Ok(part2t.to_string());
        }
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes match (represent the same language).
/// Region subtags are ignored, so "pt" matches "pt-BR".
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = base_code(code);

    if normalized.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized) {
            return Ok(lang.to_name().to_string());
        }
    }

    if normalized.len() == 3 {
        let part2t = part2b_to_part2t(&normalized).unwrap_or(&normalized);
        if let Some(lang) = Language::from_639_3(part2t) {
            return Ok(lang.to_name().to_string());
        }
    }

    Err(anyhow!("Could not find language name for code: {}", code))
}

/// Display name for prompt text, locale-aware where it matters for
/// translation register. Unknown codes fall back to isolang, then to the
/// code itself; "auto" reads as English for prompt purposes.
pub fn prompt_language_name(code: &str) -> String {
    match code.trim() {
        "pt-BR" => "Brazilian Portuguese".to_string(),
        "pt-PT" => "European Portuguese".to_string(),
        "zh-TW" => "Traditional Chinese".to_string(),
        "zh-CN" => "Simplified Chinese".to_string(),
        "auto" => "English".to_string(),
        other => get_language_name(other).unwrap_or_else(|_| other.to_string()),
    }
}
