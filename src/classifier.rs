/*!
 * Line classification for subtitle cues.
 *
 * Zero-cost pre-filter in front of the translation backends: every line is
 * classified by regex and word lists so that sound effects, music markers,
 * technical tags and untranslatable fragments never reach a model.
 */

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// How a line should be processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineClass {
    /// Translate through the backend
    Dialogue,
    /// Translated locally via the SFX dictionary
    SoundEffect,
    /// Kept unchanged by default
    Music,
    /// Preserved byte-for-byte, never sent to a model
    TechnicalTag,
    /// Kept verbatim (onomatopoeia, preserved foreign terms, punctuation)
    Untranslatable,
}

/// Classification result: the class plus the processed text.
/// For SoundEffect the text is already the local translation; for
/// TechnicalTag and Untranslatable it is the original verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub class: LineClass,
    pub text: String,
}

impl ClassifiedLine {
    fn new(class: LineClass, text: impl Into<String>) -> Self {
        Self { class, text: text.into() }
    }
}

/// Onomatopoeia kept as-is
static ONOMATOPOEIA: &[&str] = &[
    "bang", "boom", "pow", "crash", "splash", "thud", "whoosh", "buzz",
    "hiss", "click", "clack", "snap", "crack", "pop", "thump", "slam",
    "screech", "rumble", "clang", "swoosh", "whack", "zap", "beep",
    "boing", "ding", "dong", "wham", "zoom", "vroom",
];

/// Foreign terms that stay untranslated in the target text
static PRESERVED_TERMS: &[&str] = &[
    "bankai", "sharingan", "rasengan", "kamehameha", "jutsu", "chakra",
    "senpai", "sensei", "sama", "kun", "chan", "san", "dono",
    "nani", "baka", "sugoi", "kawaii", "yatta", "ganbatte",
    "itadakimasu", "gochisousama", "tadaima", "okaeri",
    "ohayo", "konnichiwa", "konbanwa", "sayonara", "matte",
];

static RE_MUSIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*[♪♫🎵🎶]+.*[♪♫🎵🎶]+\s*$").unwrap());
static RE_FULL_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\{[^}]+\}\s*$").unwrap());
static RE_ONLY_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\W]+$").unwrap());
static RE_SOUND_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\[\(]([^\]\)]+)[\]\)]\s*$").unwrap());
static RE_SOUND_ASTERISK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\*([^*]+)\*\s*$").unwrap());
static RE_SOUND_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*[\[\(]?\s*\b(sighs?|gasps?|groans?|screams?|laughs?|coughs?|sobs?|sniffs?|chuckles?|giggles?|whispers?|shouts?|yells?|cries?|moans?|grunts?|snores?|growls?|hums?|whistles?|claps?|knocks?|footsteps|gunshots?|explosions?|thunder|wind|rain|door|phone|music playing|indistinct chatter|crowd cheering|alarm|siren|breathing|panting|stammering|stuttering|ringing|beeping|buzzing|ticking|clicking|creaking|applause|laughter|silence|static|speaking [a-z]+|talking|singing|crying|sobbing|wailing|inhales?|exhales?)\s*[\]\)]?\s*$",
    )
    .unwrap()
});

/// Built-in EN -> pt-BR sound effect dictionary. Keys are lowercase; the
/// longest matching key wins on partial matches ("door creaking").
fn default_sfx_dictionary() -> HashMap<String, String> {
    let pairs: &[(&str, &str)] = &[
        ("sighs", "suspira"), ("sigh", "suspiro"), ("sighing", "suspirando"),
        ("gasps", "ofega"), ("gasp", "ofego"), ("gasping", "ofegando"),
        ("groans", "geme"), ("groan", "gemido"), ("groaning", "gemendo"),
        ("screams", "grita"), ("scream", "grito"), ("screaming", "gritando"),
        ("laughs", "ri"), ("laugh", "risada"), ("laughing", "rindo"), ("laughter", "risadas"),
        ("coughs", "tosse"), ("cough", "tosse"), ("coughing", "tossindo"),
        ("sobs", "soluça"), ("sob", "soluço"), ("sobbing", "soluçando"),
        ("sniffs", "funga"), ("sniff", "fungada"), ("sniffing", "fungando"),
        ("chuckles", "dá risada"), ("chuckle", "risadinha"),
        ("giggles", "dá risadinha"), ("giggle", "risadinha"),
        ("whispers", "sussurra"), ("whisper", "sussurro"), ("whispering", "sussurrando"),
        ("shouts", "grita"), ("shout", "grito"), ("shouting", "gritando"),
        ("yells", "berra"), ("yell", "berro"), ("yelling", "berrando"),
        ("cries", "chora"), ("cry", "choro"), ("crying", "chorando"),
        ("moans", "geme"), ("moan", "gemido"),
        ("grunts", "rosna"), ("grunt", "rosnado"),
        ("growls", "rosna"), ("growl", "rosnado"),
        ("hums", "cantarola"), ("hum", "cantarolar"), ("humming", "cantarolando"),
        ("whistles", "assobia"), ("whistle", "assobio"), ("whistling", "assobiando"),
        ("claps", "aplaude"), ("clap", "aplauso"), ("clapping", "aplaudindo"),
        ("knocks", "bate"), ("knock", "batida"), ("knocking", "batendo na porta"),
        ("footsteps", "passos"),
        ("gunshot", "tiro"), ("gunshots", "tiros"),
        ("explosion", "explosão"), ("explosions", "explosões"),
        ("thunder", "trovão"), ("wind", "vento"), ("rain", "chuva"),
        ("door", "porta"), ("phone", "telefone"),
        ("music playing", "música tocando"),
        ("indistinct chatter", "conversa indistinta"),
        ("crowd cheering", "multidão comemorando"),
        ("alarm", "alarme"), ("siren", "sirene"),
        ("breathing", "respirando"), ("panting", "ofegando"),
        ("stammering", "gaguejando"), ("stuttering", "gaguejando"),
        ("ringing", "tocando"), ("beeping", "bipando"), ("buzzing", "zumbindo"),
        ("ticking", "tiquetaqueando"), ("clicking", "clicando"), ("creaking", "rangendo"),
        ("applause", "aplausos"), ("silence", "silêncio"), ("static", "estática"),
        ("singing", "cantando"), ("talking", "falando"), ("wailing", "lamentando"),
        ("inhales", "inspira"), ("inhale", "inspiração"),
        ("exhales", "expira"), ("exhale", "expiração"),
        ("snoring", "roncando"), ("snores", "ronca"),
        ("barking", "latindo"), ("barks", "late"),
        ("meowing", "miando"), ("meows", "mia"),
        ("birds chirping", "pássaros cantando"), ("chirping", "piando"),
        ("glass shattering", "vidro quebrando"), ("shattering", "estilhaçando"),
        ("engine revving", "motor acelerando"),
        ("tires screeching", "pneus cantando"),
        ("water running", "água corrente"),
        ("bell ringing", "sino tocando"),
        ("horn honking", "buzina"),
        ("clears throat", "pigarreia"),
        ("whimpering", "choramingando"), ("whimpers", "choraminga"),
        ("scoffs", "zomba"), ("sneezes", "espirra"), ("yawns", "boceja"),
        ("gulps", "engole em seco"), ("swallows", "engole"),
        ("mumbling", "murmurando"), ("muttering", "resmungando"),
        ("snickers", "ri baixinho"),
    ];
    pairs
        .iter()
        .map(|(en, pt)| (en.to_string(), pt.to_string()))
        .collect()
}

/// Classifies each subtitle line to decide how it is processed.
///
/// Deterministic, side-effect-free and idempotent: classifying an already
/// classified output yields the same class.
pub struct LineClassifier {
    sfx: HashMap<String, String>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    /// Classifier with the built-in EN -> pt-BR sound effect dictionary
    pub fn new() -> Self {
        Self { sfx: default_sfx_dictionary() }
    }

    /// Classifier with a replacement dictionary for another target language
    pub fn with_sfx_dictionary(sfx: HashMap<String, String>) -> Self {
        Self { sfx }
    }

    /// Classify one line. Rules run top to bottom; first match wins.
    pub fn classify(&self, text: &str) -> ClassifiedLine {
        let stripped = text.trim();
        if stripped.is_empty() {
            return ClassifiedLine::new(LineClass::Untranslatable, text);
        }

        // 1. Pure override block, nothing else
        if RE_FULL_TAG.is_match(stripped) {
            return ClassifiedLine::new(LineClass::TechnicalTag, text);
        }

        // 2. Only punctuation/symbols
        if RE_ONLY_PUNCTUATION.is_match(stripped) {
            return ClassifiedLine::new(LineClass::Untranslatable, text);
        }

        // 3. Music glyphs on both ends
        if RE_MUSIC.is_match(stripped) || (stripped.starts_with('♪') && stripped.ends_with('♪')) {
            return ClassifiedLine::new(LineClass::Music, stripped);
        }

        // 4. Sound effect in brackets or parens: [door creaking], (sighs)
        if let Some(caps) = RE_SOUND_BRACKET.captures(stripped) {
            let inner = caps[1].trim().to_lowercase();
            let open = stripped.chars().next().unwrap();
            let close = stripped.chars().next_back().unwrap();

            if self.contains_target_sfx(&inner) {
                // Already carries a translated effect; keep stable
                return ClassifiedLine::new(LineClass::SoundEffect, stripped);
            }
            let translated = self.translate_sfx(&inner);
            if translated != inner || RE_SOUND_WORDS.is_match(stripped) {
                return ClassifiedLine::new(
                    LineClass::SoundEffect,
                    format!("{}{}{}", open, translated, close),
                );
            }
        }

        // 5. Sound effect between asterisks: *sighs*
        if let Some(caps) = RE_SOUND_ASTERISK.captures(stripped) {
            let inner = caps[1].trim().to_lowercase();
            if self.contains_target_sfx(&inner) {
                return ClassifiedLine::new(LineClass::SoundEffect, stripped);
            }
            let translated = self.translate_sfx(&inner);
            return ClassifiedLine::new(LineClass::SoundEffect, format!("*{}*", translated));
        }

        // 6. Bare sound effect word without delimiters
        if RE_SOUND_WORDS.is_match(stripped) {
            let inner = stripped.trim_matches(['[', ']', '(', ')', ' ']).to_lowercase();
            return ClassifiedLine::new(LineClass::SoundEffect, self.translate_sfx(&inner));
        }
        if self.sfx.values().any(|v| v == &stripped.to_lowercase()) {
            return ClassifiedLine::new(LineClass::SoundEffect, stripped);
        }

        // 7. Pure onomatopoeia or a preserved foreign term
        let bare = stripped.to_lowercase();
        let bare = bare.trim_end_matches(['!', '.']).trim();
        if ONOMATOPOEIA.contains(&bare) || PRESERVED_TERMS.contains(&bare) {
            return ClassifiedLine::new(LineClass::Untranslatable, text);
        }

        // 8. Too little alphabetic content to translate
        let alpha_count = stripped.chars().filter(|c| c.is_alphabetic()).count();
        if alpha_count < 2 {
            return ClassifiedLine::new(LineClass::Untranslatable, text);
        }

        ClassifiedLine::new(LineClass::Dialogue, stripped)
    }

    /// Classify a batch of lines
    pub fn classify_batch(&self, texts: &[String]) -> Vec<ClassifiedLine> {
        texts.iter().map(|t| self.classify(t)).collect()
    }

    /// Translate a sound effect via the dictionary: exact match first, then
    /// every contained key replaced longest-first so that "door creaking"
    /// becomes "porta rangendo" rather than a half-translated mix.
    fn translate_sfx(&self, effect: &str) -> String {
        let effect = effect.trim().to_lowercase();

        if let Some(translated) = self.sfx.get(&effect) {
            return translated.clone();
        }

        let mut keys: Vec<&String> = self.sfx.keys().filter(|k| effect.contains(k.as_str())).collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

        let mut result = effect.clone();
        for key in keys {
            if result.contains(key.as_str()) {
                result = result.replace(key.as_str(), &self.sfx[key]);
            }
        }
        result
    }

    /// Whether the text already reads as a translated effect: an exact
    /// dictionary value, or made of words that are dictionary values.
    fn contains_target_sfx(&self, text: &str) -> bool {
        if self.sfx.values().any(|v| v == text) {
            return true;
        }
        text.split_whitespace().any(|word| self.sfx.values().any(|v| v == word))
    }
}
