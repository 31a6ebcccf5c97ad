//! Concept-card data model.
//!
//! A [`ConceptCard`] is the persisted, evidence-backed artifact produced by
//! the compiler. Cards serialize deterministically (fixed field order,
//! sorted `related` and `tags`), so the SHA-256 of the serialized bytes is
//! a stable content hash for the manifest.

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::models::sha256_hex;

/// Version suffix of card identifiers.
pub const CARD_VERSION: &str = "v1";

/// Build the card identifier `concept:<slug>:v1`.
pub fn card_id(slug: &str) -> String {
    format!("concept:{}:{}", slug, CARD_VERSION)
}

/// Canonical slug spelling: lowercase words joined by `-`. Does not validate.
pub fn slug_form(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize and validate a concept slug.
///
/// Applies [`slug_form`] and accepts only `[a-z0-9._-]`. Anything else is a
/// [`BAD_CARD`](crate::error::ErrorCode::BadCard).
pub fn normalize_slug(raw: &str) -> Result<String, CompileError> {
    let slug = slug_form(raw);
    if slug.is_empty() {
        return Err(CompileError::bad_card("empty slug"));
    }
    if let Some(c) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CompileError::bad_card(format!(
            "invalid character {:?} in slug '{}'",
            c, slug
        )));
    }
    Ok(slug)
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub rfc_number: u32,
    pub section: String,
    pub url: String,
}

/// A content-addressed citation backing one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub sha256: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub evidence: Vec<Evidence>,
}

/// The definitional excerpt and the section it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub rfc_number: u32,
    pub section: String,
    pub title: String,
    pub url: String,
    pub sha256: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Build time, RFC 3339 UTC.
    pub built_at: String,
    /// Hash of the index the card was compiled against.
    pub index_hash: String,
    pub compiler_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptCard {
    pub id: String,
    pub slug: String,
    pub definition: Definition,
    pub claims: Vec<Claim>,
    pub provenance: Provenance,
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConceptCard {
    /// Deterministic JSON bytes used for storage and hashing.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// SHA-256 over [`canonical_bytes`](Self::canonical_bytes).
    pub fn content_hash(&self) -> serde_json::Result<String> {
        Ok(sha256_hex(&self.canonical_bytes()?))
    }

    /// True if the card was compiled against a different index.
    pub fn is_stale(&self, live_index_hash: &str) -> bool {
        is_stale(&self.provenance.index_hash, live_index_hash)
    }

    /// Sort and dedupe `related` and `tags`, and drop self-links.
    pub fn normalize_links(&mut self) {
        self.related.retain(|r| !r.is_empty() && r != &self.slug);
        self.related.sort();
        self.related.dedup();
        self.tags.retain(|t| !t.is_empty());
        self.tags.sort();
        self.tags.dedup();
    }

    /// Check the evidence invariant: every claim has at least one evidence
    /// entry, and every entry carries a hash and a well-formed source.
    pub fn check_citations(&self) -> Result<(), CompileError> {
        if self.claims.is_empty() {
            return Err(CompileError::missing_citation(format!(
                "card '{}' has no claims",
                self.slug
            )));
        }
        for (i, claim) in self.claims.iter().enumerate() {
            if claim.evidence.is_empty() {
                return Err(CompileError::missing_citation(format!(
                    "claim {} of '{}' has no evidence",
                    i, self.slug
                )));
            }
            for ev in &claim.evidence {
                if ev.sha256.trim().is_empty() {
                    return Err(CompileError::missing_citation(format!(
                        "claim {} of '{}' has evidence without a hash",
                        i, self.slug
                    )));
                }
                if ev.source.rfc_number == 0 || ev.source.section.trim().is_empty() {
                    return Err(CompileError::bad_card(format!(
                        "claim {} of '{}' has a malformed source reference",
                        i, self.slug
                    )));
                }
            }
        }
        if self.definition.sha256.trim().is_empty() {
            return Err(CompileError::missing_citation(format!(
                "definition of '{}' has no hash",
                self.slug
            )));
        }
        Ok(())
    }
}

/// Pure staleness check: a card is stale when its recorded index hash
/// differs from the live one.
pub fn is_stale(card_index_hash: &str, live_index_hash: &str) -> bool {
    card_index_hash != live_index_hash
}
