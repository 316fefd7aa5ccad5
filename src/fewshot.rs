/*!
 * Genre-matched few-shot examples for translation prompts.
 *
 * Each genre family carries a handful of EN -> pt-BR pairs demonstrating
 * register and common pitfalls. Only the EN -> pt-BR pair is bundled, so
 * few-shots are disabled for every other language pair regardless of the
 * feature flag.
 */

/// One example pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FewshotExample {
    pub source: &'static str,
    pub target: &'static str,
}

const ANIME: &[FewshotExample] = &[
    FewshotExample {
        source: "If my lifespan was predetermined, I wonder how I'd handle that?",
        target: "Se minha vida fosse predeterminada, me pergunto como eu lidaria com isso?",
    },
    FewshotExample {
        source: "Don't underestimate the power of a Saiyan!",
        target: "Não subestime o poder de um Saiyan!",
    },
    FewshotExample {
        source: "Senpai, you really saved me back there. Arigato!",
        target: "Senpai, você realmente me salvou lá atrás. Arigato!",
    },
    FewshotExample {
        source: "I'll never forgive you for what you did to my nakama!",
        target: "Eu nunca vou te perdoar pelo que fez com meus nakama!",
    },
];

const LIVE_ACTION: &[FewshotExample] = &[
    FewshotExample {
        source: "Look, I know it's none of my business, but you gotta stop doing this to yourself.",
        target: "Olha, eu sei que não é da minha conta, mas você precisa parar de fazer isso consigo mesmo.",
    },
    FewshotExample {
        source: "Are you kidding me right now? This is the worst timing ever!",
        target: "Tá de brincadeira comigo? Esse é o pior momento possível!",
    },
    FewshotExample {
        source: "I've been thinking... maybe we should take a break.",
        target: "Eu tava pensando... talvez a gente devesse dar um tempo.",
    },
    FewshotExample {
        source: "Dude, you're not gonna believe what just happened.",
        target: "Cara, você não vai acreditar no que acabou de acontecer.",
    },
];

const DOCUMENTARY: &[FewshotExample] = &[
    FewshotExample {
        source: "The migration patterns of these species have been extensively studied over the past decade.",
        target: "Os padrões migratórios dessas espécies foram extensivamente estudados na última década.",
    },
    FewshotExample {
        source: "Scientists believe that climate change could drastically alter the ecosystem within the next 50 years.",
        target: "Cientistas acreditam que as mudanças climáticas podem alterar drasticamente o ecossistema nos próximos 50 anos.",
    },
    FewshotExample {
        source: "This remarkable discovery challenges everything we thought we knew about human evolution.",
        target: "Essa descoberta notável desafia tudo que pensávamos saber sobre a evolução humana.",
    },
];

const NEUTRAL: &[FewshotExample] = &[
    FewshotExample {
        source: "If my lifespan was predetermined",
        target: "Se minha vida fosse predeterminada",
    },
    FewshotExample {
        source: "I wonder how I'd handle that?",
        target: "Me pergunto como eu lidaria com isso?",
    },
    FewshotExample { source: "Don't......", target: "Não..." },
    FewshotExample {
        source: "What the hell are you talking about?",
        target: "Que droga você tá falando?",
    },
];

fn examples_for_genre(genre: &str) -> Option<&'static [FewshotExample]> {
    match genre {
        "anime" | "animation" | "shounen" | "shoujo" | "seinen" | "josei" | "isekai" | "mecha"
        | "magical girl" | "slice of life" => Some(ANIME),
        "live_action" | "drama" | "comedy" | "action" | "thriller" | "horror" | "romance"
        | "crime" | "mystery" | "sci-fi" | "fantasy" | "adventure" | "western" | "war" => {
            Some(LIVE_ACTION)
        }
        "documentary" | "news" | "reality" | "talk show" | "educational" | "history"
        | "science" | "nature" | "biography" => Some(DOCUMENTARY),
        _ => None,
    }
}

/// Whether bundled examples exist for a language pair. Few-shots are only
/// usable for EN (or auto) into pt-BR.
pub fn pair_supported(source_lang: &str, target_lang: &str) -> bool {
    matches!(source_lang, "en" | "auto") && target_lang == "pt-BR"
}

/// Select few-shot examples for a series type and genre list. Falls back
/// to neutral examples when nothing matches.
pub fn examples_for(
    series_kind: &str,
    genres: &[String],
    max_examples: usize,
) -> &'static [FewshotExample] {
    if let Some(examples) = examples_for_genre(&series_kind.to_lowercase()) {
        return &examples[..examples.len().min(max_examples)];
    }

    for genre in genres {
        if let Some(examples) = examples_for_genre(&genre.to_lowercase()) {
            return &examples[..examples.len().min(max_examples)];
        }
    }

    &NEUTRAL[..NEUTRAL.len().min(max_examples)]
}
