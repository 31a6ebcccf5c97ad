//! Concept-card compiler pipeline.
//!
//! Each compile request walks a fixed sequence of [`Stage`]s:
//!
//! ```text
//! ROUTE → RETRIEVE → SELECT_EVIDENCE → ASSEMBLE → DONE
//!   │         │              │              │
//!   └─────────┴──────────────┴──────────────┴──▶ ERROR(code)
//! ```
//!
//! This module is the pure part: given an index, a lexicon, and parameters
//! it either returns a [`ConceptCard`] satisfying the evidence invariant or
//! a typed [`CompileError`]. Link validation and persistence need the card
//! store and live in the application's engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::card::{
    card_id, normalize_slug, Claim, ConceptCard, Definition, Evidence, EvidenceSource, Provenance,
};
use crate::define::{definitional_sentence, truncate_chars};
use crate::error::CompileError;
use crate::index::Index;
use crate::lexicon::{normalize_words, Lexicon};
use crate::models::Section;
use crate::rank::{score_query, RankMode, RankParams, ScoredHit, Scope};
use crate::router::Router;

/// Version recorded in every card's provenance.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pipeline stages, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Route,
    Retrieve,
    SelectEvidence,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Route => "ROUTE",
            Stage::Retrieve => "RETRIEVE",
            Stage::SelectEvidence => "SELECT_EVIDENCE",
            Stage::Assemble => "ASSEMBLE",
        })
    }
}

/// How preferred section titles are matched (always case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleMatch {
    /// Title contains the preferred word.
    #[default]
    Contains,
    /// Title equals the preferred word after trimming.
    Exact,
}

impl FromStr for TitleMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(TitleMatch::Contains),
            "exact" => Ok(TitleMatch::Exact),
            other => Err(format!(
                "unknown title match rule '{}'. Use contains or exact.",
                other
            )),
        }
    }
}

/// Compiler tuning, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileParams {
    /// Top hit's TF-IDF cosine must reach this or the compile is LOW_CONFIDENCE.
    pub min_score: f64,
    /// A preferred-title section is chosen if its hybrid score is within this of the top.
    pub title_tolerance: f64,
    /// Lowercase preferred titles, in priority order.
    pub preferred_titles: Vec<String>,
    pub title_match: TitleMatch,
    /// Maximum claims per card, including the definitional claim.
    pub max_claims: usize,
    pub definition_max_chars: usize,
    pub claim_max_chars: usize,
    pub rank: RankParams,
}

impl Default for CompileParams {
    fn default() -> Self {
        Self {
            min_score: 0.05,
            title_tolerance: 0.15,
            preferred_titles: ["introduction", "overview", "terminology", "definitions"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            title_match: TitleMatch::Contains,
            max_claims: 3,
            definition_max_chars: 1000,
            claim_max_chars: 200,
            rank: RankParams::default(),
        }
    }
}

/// Cross-links and tags to stamp on the compiled card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardLinks {
    pub related: Vec<String>,
    pub tags: Vec<String>,
}

/// Compile one concept against `index`.
///
/// `built_at` is recorded verbatim in the card's provenance.
pub fn compile_card(
    index: &Index,
    lexicon: &Lexicon,
    params: &CompileParams,
    raw_slug: &str,
    links: CardLinks,
    built_at: &str,
) -> Result<ConceptCard, CompileError> {
    let slug = normalize_slug(raw_slug)?;

    // ROUTE
    let query = slug.replace(['-', '_', '.'], " ");
    let router = Router::new(index, lexicon, &params.rank);
    let decision = router.define(&query, &normalize_words(&query));
    let rfc = decision.document().ok_or_else(|| {
        CompileError::no_match(format!("{}: no document resolves for '{}'", Stage::Route, slug))
    })?;
    tracing::debug!(slug = %slug, rfc, rationale = %decision.rationale, "routed concept");

    // RETRIEVE
    let hits = score_query(
        index,
        &query,
        RankMode::Hybrid,
        Scope::Document(rfc),
        &params.rank,
        None,
    );
    let top = hits.first().ok_or_else(|| {
        CompileError::no_match(format!(
            "{}: RFC {} has no sections in the index",
            Stage::Retrieve,
            rfc
        ))
    })?;

    // SELECT_EVIDENCE
    if top.tfidf < params.min_score {
        tracing::warn!(slug = %slug, rfc, score = top.tfidf, "low confidence compile");
        return Err(CompileError::low_confidence(format!(
            "{}: top score {:.4} for '{}' in RFC {} is below {:.4}",
            Stage::SelectEvidence,
            top.tfidf,
            slug,
            rfc,
            params.min_score
        )));
    }
    let chosen = select_definitional(&hits, params).unwrap_or(top);
    let def_section = section_at(index, chosen.position)?;

    // ASSEMBLE
    let mut claim_sections: Vec<&Section> = vec![def_section];
    for hit in &hits {
        if claim_sections.len() >= params.max_claims.max(1) {
            break;
        }
        if hit.position != chosen.position && hit.bm25 > 0.0 {
            claim_sections.push(section_at(index, hit.position)?);
        }
    }

    let mut related = Vec::with_capacity(links.related.len());
    for r in &links.related {
        let r = normalize_slug(r).map_err(|e| {
            CompileError::bad_card(format!("{}: related slug: {}", Stage::Assemble, e.message))
        })?;
        related.push(r);
    }

    let mut card = ConceptCard {
        id: card_id(&slug),
        slug: slug.clone(),
        definition: Definition {
            rfc_number: def_section.rfc_number,
            section: def_section.section.clone(),
            title: def_section.title.clone(),
            url: def_section.url(),
            sha256: def_section.sha256.clone(),
            text: truncate_chars(def_section.text.trim(), params.definition_max_chars),
        },
        claims: claim_sections
            .iter()
            .map(|s| Claim {
                text: claim_text(s, params.claim_max_chars),
                evidence: vec![evidence_for(s)],
            })
            .collect(),
        provenance: Provenance {
            built_at: built_at.to_string(),
            index_hash: index.hash().to_string(),
            compiler_version: COMPILER_VERSION.to_string(),
        },
        related,
        tags: links.tags,
    };
    card.normalize_links();
    card.check_citations()?;

    tracing::debug!(slug = %slug, claims = card.claims.len(), "assembled concept card");
    Ok(card)
}

/// Pick the definitional hit: the first preferred-title hit within
/// tolerance of the top hybrid score, else the top hit. `None` when `hits`
/// is empty.
pub fn select_definitional<'h>(
    hits: &'h [ScoredHit],
    params: &CompileParams,
) -> Option<&'h ScoredHit> {
    let top = hits.first()?;
    let floor = top.hybrid - params.title_tolerance;
    for preferred in &params.preferred_titles {
        if let Some(hit) = hits.iter().find(|h| {
            h.matched()
                && h.hybrid >= floor
                && title_matches(&h.section.title, preferred, params.title_match)
        }) {
            return Some(hit);
        }
    }
    Some(top)
}

fn title_matches(title: &str, preferred: &str, rule: TitleMatch) -> bool {
    let title = title.trim().to_lowercase();
    let preferred = preferred.trim().to_lowercase();
    match rule {
        TitleMatch::Contains => title.contains(&preferred),
        TitleMatch::Exact => title == preferred,
    }
}

fn section_at(index: &Index, pos: usize) -> Result<&Section, CompileError> {
    index.section(pos).ok_or_else(|| {
        CompileError::bad_card(format!("{}: dangling section position {}", Stage::Assemble, pos))
    })
}

fn claim_text(section: &Section, max_chars: usize) -> String {
    if let Some(sentence) = definitional_sentence(&section.text) {
        if sentence.chars().count() <= max_chars {
            return sentence;
        }
    }
    let flat = section.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}...", truncate_chars(&flat, max_chars))
    } else {
        flat
    }
}

fn evidence_for(section: &Section) -> Evidence {
    Evidence {
        source: EvidenceSource {
            kind: "rfc".to_string(),
            rfc_number: section.rfc_number,
            section: section.section.clone(),
            url: section.url(),
        },
        sha256: section.sha256.clone(),
        length: section.length,
    }
}
