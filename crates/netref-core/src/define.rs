//! Definition assembler: extracts a cited definition from ranked sections.
//!
//! Answers are extracted from corpus text, never generated. The assembler
//! looks for a sentence that reads like a definition ("X is a ...",
//! "... refers to ...") in the ranked sections of the target document and
//! falls back to the top section's opening sentence.

use serde::Serialize;

use crate::index::Index;
use crate::models::{rfc_url, Section};
use crate::rank::ScoredHit;
use crate::router::RouterDecision;

/// Phrases that mark a sentence as definitional.
pub const DEFINITION_INDICATORS: &[&str] = &[
    "is defined as",
    "means",
    "refers to",
    "denotes",
    "is a",
    "is an",
    "is the",
    "specifies",
    "describes",
];

/// Sentences at or below this many characters are too short to stand alone.
const MIN_SENTENCE_CHARS: usize = 20;
/// Prefix length used when no usable sentence exists.
const FALLBACK_PREFIX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionAnswer {
    pub rfc_number: u32,
    pub section: String,
    pub title: String,
    pub url: String,
    pub sha256: String,
    pub text: String,
    /// `RFC {n}, Section {s}: {title}`.
    pub citation: String,
    pub confidence: f64,
}

/// Build a definition answer for a DEFINE decision from its ranked hits.
///
/// Only hits with lexical overlap are considered. Returns `None` when there
/// are none. Confidence is the router's, halved if no sentence carried a
/// definition indicator.
pub fn assemble_definition(
    index: &Index,
    decision: &RouterDecision,
    hits: &[ScoredHit],
) -> Option<DefinitionAnswer> {
    let matched: Vec<&Section> = hits
        .iter()
        .filter(|h| h.matched())
        .filter_map(|h| index.section(h.position))
        .collect();
    let top = *matched.first()?;

    let found = matched
        .iter()
        .find_map(|s| definitional_sentence(&s.text).map(|text| (*s, text)));

    let (section, text, confidence) = match found {
        Some((s, text)) => (s, text, decision.confidence),
        None => (top, lead_text(&top.text), decision.confidence * 0.5),
    };

    Some(DefinitionAnswer {
        rfc_number: section.rfc_number,
        section: section.section.clone(),
        title: section.title.clone(),
        url: rfc_url(section.rfc_number),
        sha256: section.sha256.clone(),
        citation: format!(
            "RFC {}, Section {}: {}",
            section.rfc_number, section.section, section.title
        ),
        text,
        confidence,
    })
}

/// First sentence of `text` containing a definition indicator and longer
/// than the minimum sentence length.
pub fn definitional_sentence(text: &str) -> Option<String> {
    split_sentences(text).into_iter().find(|s| {
        let lower = format!(" {} ", s.to_lowercase());
        s.chars().count() > MIN_SENTENCE_CHARS
            && DEFINITION_INDICATORS
                .iter()
                .any(|ind| lower.contains(&format!(" {} ", ind)))
    })
}

/// First sentence if it is long enough, else the first 200 characters.
pub fn lead_text(text: &str) -> String {
    match split_sentences(text).into_iter().next() {
        Some(s) if s.chars().count() > MIN_SENTENCE_CHARS => s,
        _ => truncate_chars(&collapse_whitespace(text), FALLBACK_PREFIX_CHARS),
    }
}

/// Split on `.`, `!` or `?` followed by whitespace or end of text, and on
/// blank lines. Whitespace inside each sentence is collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '\n' && next == Some('\n') {
            push_sentence(&mut out, &mut current);
            i += 2;
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && next.map_or(true, char::is_whitespace) {
            push_sentence(&mut out, &mut current);
        }
        i += 1;
    }
    push_sentence(&mut out, &mut current);
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let s = collapse_whitespace(current);
    if !s.is_empty() {
        out.push(s);
    }
    current.clear();
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
