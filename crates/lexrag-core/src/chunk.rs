//! Structure-aware text chunker.
//!
//! Splits document text into [`ChunkSegment`]s that are small enough to
//! embed and coherent enough to retrieve on their own. Three strategies are
//! tried in order and the first one that produces a usable split wins.
//!
//! # Algorithm
//!
//! 1. **Structural markers.** Split immediately before every article marker
//!    (`Art. N`, `Article N`, `Artículo N`, case-insensitive). Segments
//!    outside `[min_chunk_size, max_chunk_size]` are dropped. Accepted when
//!    at least two segments survive.
//! 2. **Paragraphs.** Split on blank lines and keep paragraphs of at least
//!    `min_chunk_size` characters. Accepted when at least one survives;
//!    paragraphs are never truncated, whatever their length.
//! 3. **Sliding window.** Split into sentences (abbreviation-aware), pack
//!    consecutive sentences up to `chunk_size` characters, and seed every
//!    new window with the trailing `overlap_fraction` of the previous
//!    window's sentences (always fewer than all of them). Always yields at least one chunk: when nothing
//!    reaches `min_chunk_size` the whole trimmed input becomes the only
//!    chunk.
//!
//! All lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use lexrag_core::chunk::{chunk_text, ChunkingParams};
//!
//! let params = ChunkingParams { min_chunk_size: 5, ..ChunkingParams::default() };
//! let chunks = chunk_text("Art. 1 Foo bar. Art. 2 Baz qux.", None, &params);
//! assert_eq!(chunks.len(), 2);
//! assert!(chunks[1].content.starts_with("Art. 2"));
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, ChunkSegment};

/// Size limits for the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingParams {
    /// Segments shorter than this are discarded (except the fallback chunk).
    pub min_chunk_size: usize,
    /// Hard ceiling for structural segments.
    pub max_chunk_size: usize,
    /// Target window length for the sliding-window strategy.
    pub chunk_size: usize,
    /// Fraction of a flushed window's sentences repeated at the start of the next one.
    pub overlap_fraction: f64,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            min_chunk_size: 100,
            max_chunk_size: 2000,
            chunk_size: 1000,
            overlap_fraction: 0.2,
        }
    }
}

impl ChunkingParams {
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk_size == 0 || self.chunk_size == 0 || self.max_chunk_size == 0 {
            return Err(RagError::validation("chunk sizes must be > 0"));
        }
        if self.min_chunk_size > self.chunk_size || self.chunk_size > self.max_chunk_size {
            return Err(RagError::validation(
                "chunk sizes must satisfy min_chunk_size <= chunk_size <= max_chunk_size",
            ));
        }
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(RagError::validation("overlap_fraction must be in [0.0, 1.0)"));
        }
        Ok(())
    }
}

/// Which strategy produced a chunk list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Structural,
    Paragraph,
    SlidingWindow,
}

/// Split `text` into chunks, tagging each with `metadata`.
///
/// Deterministic and infallible. The returned list is never empty.
pub fn chunk_text(
    text: &str,
    metadata: Option<&ChunkMetadata>,
    params: &ChunkingParams,
) -> Vec<ChunkSegment> {
    let (strategy, contents) = split(text, params);
    tracing::debug!(?strategy, chunks = contents.len(), "chunked document");
    contents
        .into_iter()
        .map(|content| ChunkSegment {
            content,
            metadata: metadata.cloned(),
        })
        .collect()
}

/// Run the strategy cascade and report which strategy won.
pub fn split(text: &str, params: &ChunkingParams) -> (ChunkStrategy, Vec<String>) {
    if let Some(segments) = split_structural(text, params) {
        return (ChunkStrategy::Structural, segments);
    }
    if let Some(segments) = split_paragraphs(text, params) {
        return (ChunkStrategy::Paragraph, segments);
    }
    (ChunkStrategy::SlidingWindow, sliding_window(text, params))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:art[íi]culo|article|art\.)\s*\d+").expect("article marker regex")
    })
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n(?:[ \t\r]*\n)+").expect("paragraph regex"))
}

fn split_structural(text: &str, params: &ChunkingParams) -> Option<Vec<String>> {
    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(marker_regex().find_iter(text).map(|m| m.start()));
    if bounds.len() == 1 {
        return None;
    }
    bounds.push(text.len());
    bounds.dedup();

    let segments: Vec<String> = bounds
        .windows(2)
        .map(|w| text[w[0]..w[1]].trim())
        .filter(|s| {
            let len = char_len(s);
            len >= params.min_chunk_size && len <= params.max_chunk_size
        })
        .map(str::to_string)
        .collect();

    (segments.len() >= 2).then_some(segments)
}

fn split_paragraphs(text: &str, params: &ChunkingParams) -> Option<Vec<String>> {
    let segments: Vec<String> = paragraph_regex()
        .split(text)
        .map(str::trim)
        .filter(|p| char_len(p) >= params.min_chunk_size)
        .map(str::to_string)
        .collect();

    (!segments.is_empty()).then_some(segments)
}

fn sliding_window(text: &str, params: &ChunkingParams) -> Vec<String> {
    let units: Vec<String> = split_sentences(text)
        .iter()
        .flat_map(|s| split_long_unit(s, params.chunk_size))
        .collect();

    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for unit in &units {
        let unit_len = char_len(unit);
        if !buffer.is_empty() && joined_len(&buffer) + 1 + unit_len > params.chunk_size {
            let flushed = buffer.join(" ");
            if char_len(&flushed) >= params.min_chunk_size {
                chunks.push(flushed);
            }
            buffer.drain(..buffer.len() - overlap_units(buffer.len(), params.overlap_fraction));
        }
        buffer.push(unit);
    }

    if !buffer.is_empty() {
        let flushed = buffer.join(" ");
        if char_len(&flushed) >= params.min_chunk_size {
            chunks.push(flushed);
        }
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

/// Units carried into the next window. At least one unit is always
/// dropped, so the window keeps advancing even for an out-of-range fraction.
fn overlap_units(unit_count: usize, fraction: f64) -> usize {
    let keep = (unit_count as f64 * fraction).floor() as usize;
    keep.min(unit_count.saturating_sub(1))
}

fn joined_len(units: &[&str]) -> usize {
    if units.is_empty() {
        return 0;
    }
    units.iter().map(|u| char_len(u)).sum::<usize>() + units.len() - 1
}

/// Abbreviations whose trailing period never closes a sentence
/// (compared lower-cased, without the period).
const ABBREVIATIONS: &[&str] = &[
    "art", "arts", "núm", "num", "no", "nro", "etc", "inc", "ltd", "sra", "srta", "lic", "pág", "pag",
    "págs", "vs", "cap", "fig", "dept", "mrs", "prof", "cf", "approx", "vol", "avda", "dto",
    "ref", "párr",
];

const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', '»', ']'];

/// Split text into sentence-like units.
///
/// A `.`, `!` or `?` followed by whitespace (optionally after closing
/// quotes or brackets) or the end of text ends a sentence, unless the
/// period closes an abbreviation (see [`is_abbreviation`]).
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if CLOSERS.contains(&next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = text[end..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
        if !at_boundary {
            continue;
        }

        if c == '.' {
            let token_start = text[..i]
                .rfind(char::is_whitespace)
                .map_or(0, |p| p + text[p..].chars().next().map_or(1, char::len_utf8));
            if is_abbreviation(&text[token_start.max(start)..i]) {
                continue;
            }
        }

        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = end;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Whether a token (the text before a period) is a short abbreviation.
fn is_abbreviation(token: &str) -> bool {
    let word = token.trim_start_matches(|c: char| !c.is_alphanumeric());
    let Some(last) = word.chars().last() else {
        return false;
    };

    // e.g. / U.S. / i.e.
    if word.contains('.') && last.is_alphabetic() {
        return true;
    }
    if !word.chars().all(char::is_alphabetic) {
        return false;
    }

    let letters = char_len(word);
    if letters == 1 {
        return true;
    }
    if letters <= 2 && word.chars().next().is_some_and(char::is_uppercase) {
        return true;
    }
    ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

/// Break a unit longer than `limit` characters at whitespace; words longer
/// than `limit` are cut at character boundaries.
fn split_long_unit(unit: &str, limit: usize) -> Vec<String> {
    if char_len(unit) <= limit {
        return vec![unit.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in unit.split_whitespace() {
        let word_len = char_len(word);
        if word_len > limit {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(limit).map(|part| part.iter().collect::<String>()));
            continue;
        }
        if !current.is_empty() && current_len + 1 + word_len > limit {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min: usize, max: usize, size: usize, overlap: f64) -> ChunkingParams {
        ChunkingParams {
            min_chunk_size: min,
            max_chunk_size: max,
            chunk_size: size,
            overlap_fraction: overlap,
        }
    }

    fn numbered_sentences(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("Sentence number {:02} talks about topic {:02}.", i, i))
            .collect()
    }

    #[test]
    fn test_article_markers_split() {
        let p = params(5, 2000, 1000, 0.2);
        let (strategy, chunks) = split("Art. 1 Foo bar. Art. 2 Baz qux.", &p);
        assert_eq!(strategy, ChunkStrategy::Structural);
        assert_eq!(chunks, vec!["Art. 1 Foo bar.", "Art. 2 Baz qux."]);
    }

    #[test]
    fn test_article_markers_case_insensitive_and_spanish() {
        let text = "Preámbulo general de la norma.\nARTÍCULO 1 Objeto de la ley.\nartículo 2 Ámbito de aplicación.";
        let (strategy, chunks) = split(text, &params(5, 2000, 1000, 0.2));
        assert_eq!(strategy, ChunkStrategy::Structural);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].starts_with("ARTÍCULO 1"));
        assert!(chunks[2].starts_with("artículo 2"));
    }

    #[test]
    fn test_structural_drops_out_of_range_segments() {
        let long_body = "x".repeat(80);
        let text = format!(
            "Art. 1 ok text here. Art. 2 {} Art. 3 also fine. Art. 4",
            long_body
        );
        let p = params(10, 50, 40, 0.2);
        let (strategy, chunks) = split(&text, &p);
        assert_eq!(strategy, ChunkStrategy::Structural);
        assert_eq!(chunks, vec!["Art. 1 ok text here.", "Art. 3 also fine."]);
        for c in &chunks {
            let len = c.chars().count();
            assert!((10..=50).contains(&len));
        }
    }

    #[test]
    fn test_single_marker_falls_through() {
        let text = "Art. 1 Everything in one single article that is long enough.";
        let (strategy, _) = split(text, &params(5, 2000, 1000, 0.2));
        assert_ne!(strategy, ChunkStrategy::Structural);
    }

    #[test]
    fn test_marker_requires_word_boundary() {
        let text = "Part. 1 of the manual.\n\nPart. 2 of the manual.";
        let (strategy, chunks) = split(text, &params(5, 2000, 1000, 0.2));
        assert_eq!(strategy, ChunkStrategy::Paragraph);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_paragraph_split() {
        let text = "First paragraph with enough text.\n\n\nSecond paragraph with enough text.\n \nshort";
        let (strategy, chunks) = split(text, &params(10, 2000, 1000, 0.2));
        assert_eq!(strategy, ChunkStrategy::Paragraph);
        assert_eq!(
            chunks,
            vec![
                "First paragraph with enough text.",
                "Second paragraph with enough text."
            ]
        );
    }

    #[test]
    fn test_oversized_paragraph_is_kept_whole() {
        let long = "Long sentence here. ".repeat(5);
        let text = format!("First paragraph that is fine.\n\n{}", long);
        let (strategy, chunks) = split(&text, &params(10, 60, 50, 0.2));
        assert_eq!(strategy, ChunkStrategy::Paragraph);
        assert_eq!(chunks, vec!["First paragraph that is fine.", long.trim()]);
        assert!(chunks[1].chars().count() > 60);
    }

    #[test]
    fn test_window_used_when_no_paragraph_is_long_enough() {
        let text = "Uno dos. Tres cuatro.\n\nCinco seis.";
        let (strategy, chunks) = split(text, &params(40, 400, 200, 0.2));
        assert_eq!(strategy, ChunkStrategy::SlidingWindow);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_window_overlap_between_consecutive_chunks() {
        let sentences = numbered_sentences(20);
        let text = sentences.join(" ");
        let chunks = sliding_window(&text, &params(10, 400, 200, 0.5));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 200, "window too long: {}", c.len());
        }

        for pair in chunks.windows(2) {
            let prev = split_sentences(&pair[0]);
            let next = split_sentences(&pair[1]);
            let keep = (prev.len() as f64 * 0.5).floor() as usize;
            assert!(keep > 0);
            assert_eq!(prev[prev.len() - keep..], next[..keep]);
        }
    }

    #[test]
    fn test_window_covers_every_sentence_in_order() {
        let sentences = numbered_sentences(23);
        let text = sentences.join(" ");
        let chunks = sliding_window(&text, &params(10, 400, 200, 0.2));
        assert!(chunks.len() > 1);

        let mut seen: Vec<String> = Vec::new();
        for c in &chunks {
            for s in split_sentences(c) {
                if seen.last() != Some(&s) && !seen.contains(&s) {
                    seen.push(s);
                }
            }
        }
        assert_eq!(seen, sentences);
    }

    #[test]
    fn test_zero_overlap_partitions_sentences() {
        let sentences = numbered_sentences(12);
        let text = sentences.join(" ");
        let chunks = sliding_window(&text, &params(10, 400, 200, 0.0));
        assert!(chunks.len() > 1);
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_overlap_seed_is_not_trimmed() {
        let text = "One two three four five. Six seven eight nine ten. \
                    Eleven twelve thirteen fourteen fifteen.";
        let chunks = sliding_window(text, &params(5, 400, 50, 0.5));
        assert_eq!(
            chunks,
            vec![
                "One two three four five. Six seven eight nine ten.",
                "Six seven eight nine ten. Eleven twelve thirteen fourteen fifteen."
            ]
        );
    }

    #[test]
    fn test_overlap_fraction_out_of_range_does_not_panic() {
        let sentences: Vec<String> = (0..24).map(|i| format!("Short {:02}.", i)).collect();
        let text = sentences.join(" ");
        for overlap in [1.0, 1.5, 10.0] {
            let chunks = sliding_window(&text, &params(5, 100, 60, overlap));
            assert!(!chunks.is_empty());
            assert!(chunks.last().unwrap().ends_with("Short 23."));
        }
        let chunks = chunk_text(&text, None, &params(5, 100, 60, 1.5));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_overlap_units() {
        assert_eq!(overlap_units(5, 0.2), 1);
        assert_eq!(overlap_units(4, 0.5), 2);
        assert_eq!(overlap_units(3, 1.5), 2);
        assert_eq!(overlap_units(1, 0.9), 0);
        assert_eq!(overlap_units(0, 0.5), 0);
    }

    #[test]
    fn test_short_document_fallback() {
        let chunks = chunk_text("  Too short.  ", None, &ChunkingParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Too short.");
    }

    #[test]
    fn test_empty_text_yields_single_empty_chunk() {
        let chunks = chunk_text("", None, &ChunkingParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
    }

    #[test]
    fn test_long_sentence_is_split_at_whitespace() {
        let text = "palabra ".repeat(300);
        let chunks = sliding_window(&text, &params(10, 400, 100, 0.2));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_sentence_split_tolerates_abbreviations() {
        let text = "El Art. 5 establece plazos. Véase también al Dr. Pérez. Fin del texto.";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "El Art. 5 establece plazos.",
                "Véase también al Dr. Pérez.",
                "Fin del texto."
            ]
        );
    }

    #[test]
    fn test_sentence_split_inner_periods_and_quotes() {
        let text = "Use e.g. this form. He said \"stop.\" Then left! Really? Yes";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "Use e.g. this form.",
                "He said \"stop.\"",
                "Then left!",
                "Really?",
                "Yes"
            ]
        );
    }

    #[test]
    fn test_numbers_end_sentences() {
        let sentences = split_sentences("It happened in 2020. Then it ended.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_metadata_is_attached_to_every_segment() {
        let meta = ChunkMetadata {
            document_id: "doc-1".into(),
            title: Some("Ley 1".into()),
            doc_type: Some("ley".into()),
            source: None,
            created_at: 0,
        };
        let p = params(5, 2000, 1000, 0.2);
        let chunks = chunk_text("Art. 1 Foo bar. Art. 2 Baz qux.", Some(&meta), &p);
        assert!(chunks.iter().all(|c| c.metadata.as_ref() == Some(&meta)));
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_sentences(30).join(" ");
        let p = params(10, 400, 200, 0.2);
        assert_eq!(split(&text, &p), split(&text, &p));
    }

    #[test]
    fn test_params_validation() {
        assert!(ChunkingParams::default().validate().is_ok());
        assert!(params(0, 10, 5, 0.2).validate().is_err());
        assert!(params(50, 100, 20, 0.2).validate().is_err());
        assert!(params(10, 100, 50, 1.0).validate().is_err());
    }
}
