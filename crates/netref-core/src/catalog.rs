//! Queries over the set of stored cards: tag counts, keyword search and the
//! manifest root hash.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::card::ConceptCard;
use crate::rank::cmp_desc;
use crate::store::ManifestEntry;
use crate::tokenize::{tokenize, unique_terms};

/// IDF used when a term occurs in every card.
const UBIQUITOUS_IDF: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptHit {
    pub slug: String,
    pub id: String,
    pub score: f64,
    pub tags: Vec<String>,
    pub stale: bool,
}

/// Tag counts over `cards`, sorted by count descending then tag.
pub fn tag_counts(cards: &[ConceptCard]) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for card in cards {
        let mut tags: Vec<&str> = card.tags.iter().map(String::as_str).collect();
        tags.sort();
        tags.dedup();
        for t in tags {
            *counts.entry(t).or_default() += 1;
        }
    }
    let mut out: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    out
}

fn card_terms(card: &ConceptCard) -> Vec<String> {
    let mut text = card.slug.clone();
    for t in &card.tags {
        text.push(' ');
        text.push_str(t);
    }
    text.push(' ');
    text.push_str(&card.definition.text);
    tokenize(&text)
}

/// Keyword search over card slugs, tags and definition text.
///
/// Score is Σ tf·idf over the query terms divided by the card's token
/// count, with `idf = ln(N/df)`. Zero scores are dropped.
pub fn search_cards(
    cards: &[ConceptCard],
    query: &str,
    limit: usize,
    live_index_hash: &str,
) -> Vec<ConceptHit> {
    let terms = unique_terms(query);
    if terms.is_empty() || cards.is_empty() {
        return Vec::new();
    }

    let docs: Vec<HashMap<String, usize>> = cards
        .iter()
        .map(|c| {
            let mut tf = HashMap::new();
            for t in card_terms(c) {
                *tf.entry(t).or_insert(0) += 1;
            }
            tf
        })
        .collect();
    let lens: Vec<usize> = docs.iter().map(|d| d.values().sum()).collect();

    let n = cards.len() as f64;
    let idf: HashMap<&str, f64> = terms
        .iter()
        .map(|t| {
            let df = docs.iter().filter(|d| d.contains_key(t)).count();
            let v = if df == 0 {
                0.0
            } else if df == cards.len() {
                UBIQUITOUS_IDF
            } else {
                (n / df as f64).ln()
            };
            (t.as_str(), v)
        })
        .collect();

    let mut hits: Vec<ConceptHit> = cards
        .iter()
        .zip(docs.iter().zip(&lens))
        .filter(|(_, (_, len))| **len > 0)
        .filter_map(|(card, (tf, len))| {
            let raw: f64 = terms
                .iter()
                .map(|t| *tf.get(t).unwrap_or(&0) as f64 * idf[t.as_str()])
                .sum();
            let score = round4(raw / *len as f64);
            (score > 0.0).then(|| ConceptHit {
                slug: card.slug.clone(),
                id: card.id.clone(),
                score,
                tags: card.tags.clone(),
                stale: card.is_stale(live_index_hash),
            })
        })
        .collect();

    hits.sort_by(|a, b| cmp_desc(a.score, b.score).then_with(|| a.slug.cmp(&b.slug)));
    hits.truncate(limit);
    hits
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// SHA-256 over `slug:sha256\n` for every manifest entry, in slug order.
pub fn root_hash(entries: &[ManifestEntry]) -> String {
    let mut sorted: Vec<&ManifestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.slug.cmp(&b.slug));
    let mut hasher = Sha256::new();
    for e in sorted {
        hasher.update(format!("{}:{}\n", e.slug, e.sha256).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
