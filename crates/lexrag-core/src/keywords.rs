//! Query keyword extraction for hybrid rescoring.

/// Maximum number of keywords returned by [`extract_keywords`].
pub const MAX_KEYWORDS: usize = 5;

/// English and Spanish function words ignored by the extractor.
///
/// Only words longer than three characters matter here; shorter tokens are
/// already discarded by length.
const STOP_WORDS: &[&str] = &[
    // English
    "about", "above", "after", "again", "against", "also", "because", "been", "before", "being",
    "below", "between", "both", "could", "does", "doing", "down", "during", "each", "from",
    "further", "have", "having", "here", "into", "just", "more", "most", "much", "only", "other",
    "over", "same", "should", "some", "such", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "until", "very", "were", "what",
    "when", "where", "which", "while", "will", "with", "would", "your",
    // Spanish
    "algo", "algunos", "ante", "antes", "aquel", "cada", "como", "contra", "cual",
    "cuales", "cuáles", "cuando", "desde", "donde", "durante", "ellos", "ellas", "entre", "esta", "estas",
    "este", "esto", "estos", "hacia", "hasta", "mismo", "mucho", "nada", "nosotros",
    "otro", "otros", "para", "pero", "poco", "porque", "puede", "quien", "quienes", "según",
    "segun", "sido", "siempre", "sobre", "solo", "sólo", "también", "tambien", "tanto", "tiene",
    "tienen", "todo", "todos", "unos", "unas", "usted", "cuál", "cómo", "dónde", "qué", "quién",
];

/// Extract up to [`MAX_KEYWORDS`] salient terms from a query.
///
/// Lower-cases, splits on whitespace, strips leading/trailing punctuation,
/// and drops tokens of three characters or fewer as well as stop words.
/// Survivors keep their original order.
///
/// ```rust
/// use lexrag_core::keywords::extract_keywords;
///
/// let kw = extract_keywords("¿Cuáles son los requisitos para una licencia de conducir?");
/// assert_eq!(kw, vec!["requisitos", "licencia", "conducir"]);
/// ```
pub fn extract_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().count() > 3)
        .filter(|token| !STOP_WORDS.contains(token))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Case-insensitive, non-overlapping occurrence count of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    haystack.to_lowercase().matches(needle.as_str()).count()
}
