/*!
 * Post-response cleaning.
 *
 * Stop sequences catch most prompt echoes, but models still leak labels,
 * explanations, CJK residue and runaway ellipses into the text. The
 * cleaner is the mandatory second line of defense before validation.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language_utils::prompt_language_name;

static RE_PREV_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s*Previous context \(read only, do NOT translate\):.*$").unwrap()
});
static RE_NOTE_PARENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\(Note that.*?\)").unwrap());
static RE_NOTE_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\[[^\]]*(?:tradução|translation)[^\]]*\]").unwrap());
static RE_CJK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}\u{3040}-\u{309f}\u{30a0}-\u{30ff}]+").unwrap());
static RE_MANY_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{4,}").unwrap());
static RE_ELLIPSIS_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\.{3}\s*){2,}").unwrap());
static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static RE_CORRUPTED_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]{15,}$").unwrap());
static RE_SHORT_SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?\n]{1,40}[.!?]").unwrap());

/// Markers that flag a response as an explanation rather than a translation
static EXPLANATION_MARKERS: &[&str] = &[
    "translator", "glossary", "context", "tradutor", "glossário", "contexto",
];

/// Cleans backend responses for one language pair
pub struct ResponseCleaner {
    source_label: String,
    target_label: String,
    prune_explanations: bool,
}

impl ResponseCleaner {
    pub fn new(source_lang: &str, target_lang: &str, prune_explanations: bool) -> Self {
        Self {
            source_label: prompt_language_name(source_lang),
            target_label: prompt_language_name(target_lang),
            prune_explanations,
        }
    }

    /// Clean one response. Returns an empty string for responses judged
    /// corrupted, which the caller treats as a failed translation.
    pub fn clean(&self, text: &str) -> String {
        // Timestamps and bare numbers pass through untouched
        if text.contains("-->") || text.trim().chars().all(|c| c.is_ascii_digit()) {
            return text.to_string();
        }

        let mut text = text.trim().to_string();

        // Prompt echoes: context block remnants and language labels
        text = RE_PREV_CONTEXT.replace_all(&text, "").into_owned();
        text = self.strip_language_labels(&text);
        text = text.trim().to_string();

        if self.prune_explanations {
            text = prune_explanation(&text);
        }

        // HTML entities
        text = crate::subtitle::decode_entities(&text);

        // CJK punctuation to ASCII
        text = text
            .replace('\u{3002}', ".")
            .replace('\u{3001}', ",")
            .replace('\u{ff01}', "!")
            .replace('\u{ff1f}', "?")
            .replace('\u{2026}', "...");

        // Runaway ellipses collapse to exactly three dots
        text = RE_MANY_DOTS.replace_all(&text, "...").into_owned();
        text = RE_ELLIPSIS_RUNS.replace_all(&text, "...").into_owned();

        // Model-added notes
        text = RE_NOTE_PARENS.replace_all(&text, "").into_owned();
        text = RE_NOTE_BRACKETS.replace_all(&text, "").into_owned();

        // CJK residue never belongs in the output
        text = RE_CJK.replace_all(&text, "").into_owned();

        // Wrapping quotes
        let trimmed = text.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            text = trimmed[1..trimmed.len() - 1].to_string();
        }

        // A long unbroken letter run at the end means corrupted output;
        // empty forces the caller down the retry path
        if RE_CORRUPTED_TAIL.is_match(text.trim()) {
            return String::new();
        }

        RE_MULTI_SPACE.replace_all(text.trim(), " ").trim().to_string()
    }

    /// Remove leading target-language labels and trailing source echoes:
    /// "Brazilian Portuguese: Olá" -> "Olá", "Olá English: Hello" -> "Olá"
    fn strip_language_labels(&self, text: &str) -> String {
        let mut result = text.trim().to_string();

        for label in [
            format!("{} (FULL translation):", self.target_label),
            format!("{}:", self.target_label),
            "Translation:".to_string(),
        ] {
            if let Some(rest) = strip_prefix_ignore_case(&result, &label) {
                result = rest.trim_start().to_string();
                break;
            }
        }

        let source_echo = format!("{}:", self.source_label);
        if let Some(pos) = find_ignore_case(&result, &source_echo) {
            if pos > 0 {
                result = result[..pos].trim_end().to_string();
            }
        }

        result
    }
}

/// Pick the short sentence buried in an explanation-shaped response.
/// Heuristic and deliberately conservative: it only rewrites responses
/// over 120 characters that mention translation machinery.
fn prune_explanation(text: &str) -> String {
    if text.len() <= 120 {
        return text.to_string();
    }
    let lower = text.to_lowercase();
    if !EXPLANATION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return text.to_string();
    }

    for found in RE_SHORT_SENTENCE.find_iter(text) {
        let candidate = found.as_str().trim();
        let candidate_lower = candidate.to_lowercase();
        if candidate.len() <= 25
            && !EXPLANATION_MARKERS.iter().any(|m| candidate_lower.contains(m))
        {
            return candidate.to_string();
        }
    }

    // Fall back to the first sentence that is not about the machinery
    for separator in [". ", "! ", "? "] {
        if let Some((first, _)) = text.split_once(separator) {
            let sentence = format!("{}{}", first, separator.trim_end());
            let sentence_lower = sentence.to_lowercase();
            if sentence.len() <= 80
                && !EXPLANATION_MARKERS.iter().any(|m| sentence_lower.contains(m))
            {
                return sentence.trim().to_string();
            }
        }
    }

    text.to_string()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// ASCII-only case folding keeps byte offsets valid for slicing
fn find_ignore_case(text: &str, needle: &str) -> Option<usize> {
    text.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> ResponseCleaner {
        ResponseCleaner::new("en", "pt-BR", false)
    }

    #[test]
    fn test_clean_plainTranslation_shouldPassThrough() {
        assert_eq!(cleaner().clean("Olá, tudo bem?"), "Olá, tudo bem?");
    }

    #[test]
    fn test_clean_shouldStripTargetLabel() {
        assert_eq!(cleaner().clean("Brazilian Portuguese: Olá"), "Olá");
        assert_eq!(cleaner().clean("Translation: Olá"), "Olá");
    }

    #[test]
    fn test_clean_shouldCutSourceEcho() {
        assert_eq!(cleaner().clean("Olá English: Hello there"), "Olá");
    }

    #[test]
    fn test_clean_shouldDropContextEcho() {
        let leaked = "Olá Previous context (read only, do NOT translate): linha antiga";
        assert_eq!(cleaner().clean(leaked), "Olá");
    }

    #[test]
    fn test_clean_shouldNormalizeCjkPunctuation() {
        assert_eq!(cleaner().clean("Olá。Tudo bem？"), "Olá.Tudo bem?");
        assert_eq!(cleaner().clean("Espera…"), "Espera...");
    }

    #[test]
    fn test_clean_shouldCollapseEllipses() {
        assert_eq!(cleaner().clean("Não......"), "Não...");
        assert_eq!(cleaner().clean("Espera... ... ..."), "Espera...");
    }

    #[test]
    fn test_clean_shouldRemoveCjkResidue() {
        assert_eq!(cleaner().clean("Olá 你好 amigo"), "Olá amigo");
    }

    #[test]
    fn test_clean_shouldStripWrappingQuotes() {
        assert_eq!(cleaner().clean("\"Olá, amigo\""), "Olá, amigo");
        // Interior quotes stay
        assert_eq!(cleaner().clean("Ele disse \"oi\" baixinho"), "Ele disse \"oi\" baixinho");
    }

    #[test]
    fn test_clean_corruptedTail_shouldReturnEmpty() {
        assert_eq!(cleaner().clean("Olá amigoptptptptptptptptpt"), "");
    }

    #[test]
    fn test_clean_timestampsAndNumbers_shouldPassThrough() {
        assert_eq!(
            cleaner().clean("00:00:01,000 --> 00:00:02,000"),
            "00:00:01,000 --> 00:00:02,000"
        );
        assert_eq!(cleaner().clean("42"), "42");
    }

    #[test]
    fn test_clean_shouldRemoveNotes() {
        assert_eq!(
            cleaner().clean("Olá (Note that this is informal) amigo"),
            "Olá amigo"
        );
        assert_eq!(cleaner().clean("Olá [tradução literal] amigo"), "Olá amigo");
    }

    #[test]
    fn test_clean_shouldCollapseWhitespace() {
        assert_eq!(cleaner().clean("Olá    meu   amigo"), "Olá meu amigo");
    }

    #[test]
    fn test_pruneExplanation_disabledByDefault() {
        let explanation = format!(
            "O tradutor considerou o contexto da cena e o glossário da série para esta linha. {} Vamos.",
            "A escolha mais natural seria outra."
        );
        // Flag off: the whole explanation survives cleaning (no markers cut)
        let kept = cleaner().clean(&explanation);
        assert!(kept.contains("tradutor"));
    }

    #[test]
    fn test_pruneExplanation_enabled_shouldPickShortSentence() {
        let pruning = ResponseCleaner::new("en", "pt-BR", true);
        let explanation =
            "O tradutor considerou o contexto da cena e o glossário da série para esta linha, \
             buscando a forma mais natural possível. Vamos logo.";

        assert_eq!(pruning.clean(explanation), "Vamos logo.");
    }

    #[test]
    fn test_pruneExplanation_shortResponse_shouldNotBeTouched() {
        let pruning = ResponseCleaner::new("en", "pt-BR", true);
        assert_eq!(pruning.clean("Contexto é tudo."), "Contexto é tudo.");
    }
}
