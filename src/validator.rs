/*!
 * Translation quality validation.
 *
 * Two layers: a per-line semantic check returning a confidence score
 * (negation inversion, pronoun gender mismatch, length ratio, artifact
 * prefixes, CJK residue), and a per-file 0-100 quality score over the
 * joined translated dialogue. The per-file layer only advises; a finished
 * translation is never discarded.
 */

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language_utils::base_code;

static WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());
static CJK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}\u{3040}-\u{309f}\u{30a0}-\u{30ff}]").unwrap());

/// English negations, contractions included
static ENGLISH_NEGATIONS: &[&str] = &[
    "not", "never", "no", "neither", "nor", "nobody", "nothing", "nowhere",
    "hardly", "barely", "scarcely", "don't", "doesn't", "didn't", "won't",
    "wouldn't", "can't", "cannot", "couldn't", "shouldn't", "isn't", "aren't",
    "wasn't", "weren't", "haven't", "hasn't", "hadn't", "mustn't", "hate",
    "refuse", "deny",
];

/// Portuguese negations and negative verbs
static PORTUGUESE_NEGATIONS: &[&str] = &[
    "não", "nunca", "nenhum", "nenhuma", "nem", "ninguém", "nada", "jamais",
    "tampouco", "sequer", "odeio", "recuso", "nego", "impossível", "incapaz",
];

/// Artifact prefixes models prepend when they explain instead of translate
static ARTIFACT_PREFIXES: &[&str] = &[
    "translation:", "tradução:", "note:", "nota:", "here is", "aqui está",
    "the translation", "a tradução", "in portuguese", "em português",
    "translated:", "output:", "result:",
];

/// Colloquial pt-BR markers; fine in dialogue unless they dominate
static COLLOQUIAL_WORDS: &[&str] = &[
    "né", "tá", "tipo", "mano", "véi", "cara", "mina", "tô", "cê", "pra", "num", "dum",
];

/// Common Portuguese words for the target-language ratio
static PORTUGUESE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "que", "não", "uma", "com", "para", "você", "ele", "ela", "isso", "mais",
        "muito", "bem", "aqui", "onde", "quando", "como", "por", "mas", "então",
        "agora", "ainda", "já", "só", "também", "até", "depois", "antes", "sobre",
        "é", "são", "foi", "foram", "ser", "está", "estão", "estou", "estamos",
        "tem", "tenho", "temos", "tinha", "vou", "vai", "vamos",
        "fiz", "fez", "fizemos", "fazer", "faço", "faz", "fazem", "feito",
        "pode", "podem", "posso", "poderia", "poder", "pude", "possa",
        "devo", "deve", "devem", "devemos", "dever", "devia",
        "preciso", "precisa", "precisam", "precisamos", "precisar",
        "quero", "quer", "querem", "queremos", "querer", "quis",
        "penso", "pensa", "pensam", "pensar", "pensava",
        "digo", "diz", "dizem", "dizemos", "dizer", "disse",
        "vejo", "vê", "veem", "vemos", "ver", "vi", "vimos", "via",
        "meu", "minha", "meus", "minhas", "nosso", "nossa", "nossos", "nossas",
        "seu", "sua", "seus", "suas", "dele", "dela", "deles", "delas",
        "isto", "aquilo", "este", "esse", "aquele", "esta", "essa", "aquela",
        "estes", "esses", "aqueles", "estas", "essas", "aquelas",
        "bom", "boa", "bons", "boas", "ruim", "ruins", "grande", "pequeno",
        "novo", "velho", "alto", "baixo", "longo", "curto", "forte", "fraco",
        "rápido", "lento", "fácil", "difícil", "bonito", "feio", "real", "falso",
        "certo", "errado", "claro", "escuro", "quente", "frio",
        "homem", "mulher", "pessoa", "filho", "filha", "pai", "mãe", "avó", "avô",
        "amigo", "amiga", "família", "casa", "tempo", "dia", "noite", "hora",
        "mundo", "vida", "morte", "amor", "ódio", "medo", "esperança", "verdade",
        "mentira", "coisa", "lugar", "maneira", "forma", "tipo", "jeito", "modo",
        "corpo", "cabeça", "coração", "mão", "pé", "olho", "boca",
        "palavra", "pergunta", "resposta", "história", "livro", "filme",
        "escola", "trabalho", "manhã", "tarde", "semana", "ano", "mês",
        "nome", "em", "ao", "de", "do", "da", "dos", "das", "ou", "nem",
        "se", "sem", "sob", "entre", "durante", "dentro", "fora", "junto",
        "contra", "através", "pouco", "bastante", "demais", "menos", "tão",
        "sim", "talvez", "certamente", "provavelmente", "sempre", "nunca",
        "ali", "lá", "cá", "hoje", "ontem", "amanhã", "cedo", "devagar",
        "um", "dois", "duas", "três", "quatro", "cinco", "seis",
        "sete", "oito", "nove", "dez", "vinte", "cem", "mil",
        "há", "havia", "houve", "seja", "fosse", "tudo", "algo", "alguém",
        "ninguém", "outro", "mesmo", "próprio", "único", "último", "primeiro",
        "próximo",
    ]
    .into_iter()
    .collect()
});

/// Common English words as a negative signal
static ENGLISH_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "you", "that", "was", "for", "are", "with", "his", "they",
        "have", "this", "will", "your", "from", "can", "said", "each", "which",
        "about", "would", "there", "their", "what", "when", "make", "like", "just",
        "time", "know", "take", "people", "year", "work", "back", "call", "hand",
        "high", "keep", "last", "long", "need", "part", "right", "seem",
        "tell", "think", "turn", "want", "way", "week", "well",
    ]
    .into_iter()
    .collect()
});

/// Result of a per-line validation
#[derive(Debug, Clone)]
pub struct LineValidation {
    /// False only when confidence fell below 0.3
    pub valid: bool,
    /// Issue list, or "OK"
    pub message: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

/// Advisory result of a per-file validation
#[derive(Debug, Clone)]
pub struct FileQuality {
    /// 0-100 quality score
    pub score: u8,
    /// Present when the score suggests problems; never blocks a save
    pub advisory: Option<String>,
}

/// Semantic validator for one target language. The negation, pronoun and
/// word-ratio checks apply when the target is Portuguese; the structural
/// checks (length, artifacts, CJK) apply to every pair.
pub struct Validator {
    target_is_portuguese: bool,
}

impl Validator {
    pub fn new(target_lang: &str) -> Self {
        Self { target_is_portuguese: base_code(target_lang) == "pt" }
    }

    /// Validate one translated line against its original
    pub fn validate_line(&self, original: &str, translated: &str) -> LineValidation {
        if original.trim().is_empty() || translated.trim().is_empty() {
            return LineValidation {
                valid: false,
                message: "Empty input".to_string(),
                confidence: 0.0,
            };
        }

        if original.trim().to_lowercase() == translated.trim().to_lowercase() {
            return LineValidation {
                valid: false,
                message: "Translation identical to original".to_string(),
                confidence: 0.0,
            };
        }

        let mut confidence: f32 = 1.0;
        let mut issues: Vec<String> = Vec::new();

        if self.target_is_portuguese {
            if let Some(issue) = check_semantic_inversion(original, translated) {
                issues.push(issue);
                confidence -= 0.4;
            }
            if let Some(issue) = check_pronoun_mismatch(original, translated) {
                issues.push(issue);
                confidence -= 0.5;
            }
        }

        let ratio = translated.trim().len() as f32 / original.trim().len().max(1) as f32;
        if ratio < 0.2 {
            issues.push(format!("Translation too short (ratio={:.2})", ratio));
            confidence -= 0.3;
        } else if ratio > 4.0 {
            issues.push(format!("Translation too long (ratio={:.2})", ratio));
            confidence -= 0.2;
        }

        let translated_lower = translated.trim().to_lowercase();
        for artifact in ARTIFACT_PREFIXES {
            if translated_lower.starts_with(artifact) {
                issues.push(format!("Artifact detected: '{}'", artifact));
                confidence -= 0.5;
                break;
            }
        }

        if CJK_REGEX.is_match(translated) {
            issues.push("CJK characters in translation".to_string());
            confidence -= 0.6;
        }

        let confidence = confidence.max(0.0);
        let message = if issues.is_empty() { "OK".to_string() } else { issues.join("; ") };

        LineValidation { valid: confidence >= 0.3, message, confidence }
    }

    /// Colloquialisms are legitimate in dialogue; only an absurd density
    /// (over 40% of the words) is rejected.
    pub fn is_colloquial_valid(&self, translated: &str) -> bool {
        let words: Vec<String> =
            translated.to_lowercase().split_whitespace().map(|w| w.to_string()).collect();
        if words.is_empty() {
            return true;
        }
        let colloquial = words
            .iter()
            .filter(|w| COLLOQUIAL_WORDS.contains(&w.as_str()))
            .count();
        (colloquial as f32 / words.len() as f32) <= 0.4
    }

    /// Per-file quality score over the joined translated dialogue.
    /// Combines a target-language ratio check (our stand-in for language
    /// detection), content length and word/pattern hit ratios.
    pub fn file_quality(&self, translated_lines: &[String]) -> FileQuality {
        if translated_lines.is_empty() {
            return FileQuality { score: 0, advisory: Some("No lines to score".to_string()) };
        }

        let full_text = translated_lines.join(" ");
        let words: Vec<String> = WORD_REGEX
            .find_iter(&full_text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect();

        let mut score: i32 = 30;

        let pt_score = portuguese_score(&full_text, &words);
        if self.target_is_portuguese {
            // Ratio threshold plays the role of a language detector
            if pt_score >= 0.20 {
                score += 30;
            }
            score += (pt_score * 100.0).min(20.0) as i32;
        } else {
            // Without word lists for the pair, length is all we have
            score += 30;
        }

        if full_text.len() > 200 {
            score += 10;
        }
        if full_text.len() > 500 {
            score += 10;
        }
        if full_text.len() > 1000 {
            score += 10;
        }

        let score = score.clamp(0, 100) as u8;
        let advisory = if score < 50 {
            Some(format!(
                "Low quality score {} (target-language ratio {:.0}%)",
                score,
                pt_score * 100.0
            ))
        } else {
            None
        };

        FileQuality { score, advisory }
    }

    /// Advisory comparison of original and translated line sets: flags runs
    /// where almost nothing changed (untranslated output) without ever
    /// failing the file.
    pub fn translation_advisory(
        &self,
        original_lines: &[String],
        translated_lines: &[String],
    ) -> Option<String> {
        let common = original_lines.len().min(translated_lines.len());
        if common == 0 {
            return None;
        }

        let unchanged = original_lines
            .iter()
            .zip(translated_lines)
            .filter(|(o, t)| o.trim() == t.trim())
            .count();
        let unchanged_ratio = unchanged as f32 / common as f32;

        if unchanged_ratio > 0.7 {
            return Some(format!(
                "{:.0}% of lines are unchanged; backend may not be translating",
                unchanged_ratio * 100.0
            ));
        }
        None
    }
}

fn word_set(text: &str) -> HashSet<String> {
    WORD_REGEX
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Negation in the original without any negation in the translation
fn check_semantic_inversion(original: &str, translated: &str) -> Option<String> {
    let original_words = word_set(original);
    let original_lower = original.to_lowercase();

    let original_has_negation = ENGLISH_NEGATIONS.iter().any(|n| original_words.contains(*n))
        || original_lower.split_whitespace().any(|w| w.contains("n't"));

    if !original_has_negation {
        return None;
    }

    let translated_words = word_set(translated);
    let translated_has_negation =
        PORTUGUESE_NEGATIONS.iter().any(|n| translated_words.contains(*n));

    if !translated_has_negation {
        return Some("Semantic inversion: original has negation but translation doesn't".to_string());
    }
    None
}

/// she/her rendered with only masculine pronouns, or the reverse
fn check_pronoun_mismatch(original: &str, translated: &str) -> Option<String> {
    let original_words = word_set(original);
    let translated_words = word_set(translated);

    let has = |set: &HashSet<String>, words: &[&str]| words.iter().any(|w| set.contains(*w));

    if has(&original_words, &["she", "her", "herself", "hers"]) {
        let feminine = has(&translated_words, &["ela", "dela"]);
        let masculine = has(&translated_words, &["ele", "dele"]);
        if masculine && !feminine {
            return Some("Pronoun mismatch: she/her translated as ele/dele".to_string());
        }
    }

    if has(&original_words, &["he", "him", "himself", "his"]) {
        let masculine = has(&translated_words, &["ele", "dele"]);
        let feminine = has(&translated_words, &["ela", "dela"]);
        if feminine && !masculine {
            return Some("Pronoun mismatch: he/him translated as ela/dela".to_string());
        }
    }

    None
}

/// Portuguese-ness of a text in [0, 1]: word-list ratio, an English
/// counter-signal, and characteristic patterns.
fn portuguese_score(full_text: &str, words: &[String]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }

    let pt_count = words.iter().filter(|w| PORTUGUESE_WORDS.contains(w.as_str())).count();
    let pt_ratio = pt_count as f32 / words.len() as f32;

    let en_count = words.iter().filter(|w| ENGLISH_WORDS.contains(w.as_str())).count();
    let en_ratio = en_count as f32 / words.len() as f32;

    let patterns = count_portuguese_patterns(full_text);

    pt_ratio * 0.6 + (1.0 - en_ratio) * 0.2 + (patterns as f32 * 0.01).min(0.2) * 0.2
}

fn count_portuguese_patterns(text: &str) -> u32 {
    static PATTERNS: Lazy<Vec<(Regex, u32)>> = Lazy::new(|| {
        vec![
            (Regex::new(r"ção\b").unwrap(), 3),
            (Regex::new(r"dade\b").unwrap(), 2),
            (Regex::new(r"\b\w+mente\b").unwrap(), 2),
            (Regex::new(r"\bvocê\b").unwrap(), 3),
            (Regex::new(r"\bnão\b").unwrap(), 2),
            (Regex::new(r"\bé\b").unwrap(), 1),
            (Regex::new(r"\bestá\b").unwrap(), 1),
            (Regex::new(r"\btem\b").unwrap(), 1),
            (Regex::new(r"\bfoi\b").unwrap(), 1),
        ]
    });

    let lower = text.to_lowercase();
    PATTERNS
        .iter()
        .map(|(re, weight)| re.find_iter(&lower).count() as u32 * weight)
        .sum()
}
