//! Lightweight English / Spanish detection for code-switching.

use hearth_core::LanguageTag;

const SPANISH_WORDS: &[&str] = &[
    "hola", "gracias", "por", "favor", "qué", "que", "cómo", "dónde", "cuándo", "cuál", "el",
    "la", "los", "las", "una", "unos", "es", "está", "estoy", "son", "necesito", "ayuda",
    "tarea", "tengo", "puedes", "para", "con", "del", "pero", "mañana", "hoy", "sí", "mi", "tu",
    "yo", "nosotros", "quiero", "hacer", "muy", "bien", "también", "y",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "an", "is", "are", "what", "how", "where", "when", "why", "please", "thanks", "thank",
    "help", "can", "you", "my", "with", "for", "and", "to", "do", "need", "want", "have", "this",
    "that", "today", "tomorrow", "homework", "i", "it", "of", "be",
];

const SPANISH_MARKS: &[char] = &['á', 'é', 'í', 'ó', 'ú', 'ñ', 'ü', '¿', '¡'];

/// Guess the language of `text`.
///
/// Each whole word found in the Spanish or English marker lists scores one
/// point for that language; every Spanish diacritic or inverted punctuation
/// mark scores one more for Spanish. Ties (including empty text) return
/// `fallback`.
pub fn detect_language(text: &str, fallback: LanguageTag) -> LanguageTag {
    let lower = text.to_lowercase();
    let mut spanish = lower.chars().filter(|c| SPANISH_MARKS.contains(c)).count();
    let mut english = 0usize;

    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if SPANISH_WORDS.contains(&word) {
            spanish += 1;
        }
        if ENGLISH_WORDS.contains(&word) {
            english += 1;
        }
    }

    match spanish.cmp(&english) {
        std::cmp::Ordering::Greater => LanguageTag::Es,
        std::cmp::Ordering::Less => LanguageTag::En,
        std::cmp::Ordering::Equal => fallback,
    }
}
