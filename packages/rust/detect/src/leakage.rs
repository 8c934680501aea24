//! Untranslated English left in localized text.

/// High-frequency English function words.
const ENGLISH_FUNCTION_WORDS: &[&str] = &[
    "the", "is", "are", "and", "or", "but", "this", "that", "with", "from", "have", "has",
    "would", "could", "they", "their", "you", "your", "we", "a", "an", "in", "on", "to", "for",
    "of", "it", "was", "were", "be", "been", "being", "do", "does", "did", "will", "shall", "can",
    "may", "not", "so", "if", "at", "by", "as", "up", "no", "all", "about",
];

/// Share of words that must be function words to count as English.
const LEAKAGE_THRESHOLD: f64 = 0.4;

/// Fewest words a short field needs before it is judged.
pub const MIN_FIELD_WORDS: usize = 3;

/// Fewest words a prose paragraph needs before it is judged.
pub const MIN_PARAGRAPH_WORDS: usize = 30;

/// Fraction of whitespace-separated words that are English function words.
pub fn english_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words
        .iter()
        .filter(|w| {
            let clean: String = w
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            ENGLISH_FUNCTION_WORDS.contains(&clean.as_str())
        })
        .count();
    hits as f64 / words.len() as f64
}

/// Whether `text` reads as English prose.
///
/// Text with fewer than `min_words` words is never judged. Text carrying
/// non-ASCII letters is assumed to be in another language.
pub fn looks_english(text: &str, min_words: usize) -> bool {
    if text.chars().any(|c| c.is_alphabetic() && !c.is_ascii()) {
        return false;
    }
    if text.split_whitespace().count() < min_words {
        return false;
    }
    english_ratio(text) > LEAKAGE_THRESHOLD
}
