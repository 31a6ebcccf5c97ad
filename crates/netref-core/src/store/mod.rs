//! Storage abstraction for concept cards.
//!
//! The [`CardStore`] trait is the seam between the compiler and wherever
//! cards live. Each store keeps two records per slug: the card body and a
//! [`ManifestEntry`] holding its content hash. Writers persist the card
//! before its manifest entry, and a reader that sees a manifest entry
//! without its card gets [`StoreError::NotReady`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::ConceptCard;
use crate::models::sha256_hex;

/// One manifest row: the content hash of a stored card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub slug: String,
    pub sha256: String,
    pub bytes: u64,
    pub built_at: String,
}

impl ManifestEntry {
    /// Build the entry for a card from its canonical bytes.
    pub fn for_card(card: &ConceptCard, body: &[u8]) -> Self {
        Self {
            slug: card.slug.clone(),
            sha256: sha256_hex(body),
            bytes: body.len() as u64,
            built_at: card.provenance.built_at.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A manifest entry exists but its card has not landed yet. Transient.
    #[error("card '{0}' is not ready")]
    NotReady(String),
    /// The stored body does not parse or does not match its manifest hash.
    #[error("card '{slug}' is corrupt: {reason}")]
    Corrupt { slug: String, reason: String },
}

impl StoreError {
    /// True if retrying the read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::NotReady(_))
    }
}

/// Decode a stored body and check it against its manifest hash.
pub fn decode_card(entry: &ManifestEntry, body: &[u8]) -> std::result::Result<ConceptCard, StoreError> {
    let actual = sha256_hex(body);
    if actual != entry.sha256 {
        return Err(StoreError::Corrupt {
            slug: entry.slug.clone(),
            reason: format!("hash {} does not match manifest {}", actual, entry.sha256),
        });
    }
    serde_json::from_slice(body).map_err(|e| StoreError::Corrupt {
        slug: entry.slug.clone(),
        reason: e.to_string(),
    })
}

/// Abstract storage backend for concept cards.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](CardStore::put) | Write a card, then its manifest entry |
/// | [`get`](CardStore::get) | Read a card by slug |
/// | [`list`](CardStore::list) | Manifest entries sorted by slug |
/// | [`delete`](CardStore::delete) | Remove a card and its manifest entry |
/// | [`gc`](CardStore::gc) | Drop orphaned cards and manifest entries |
/// | [`all_cards`](CardStore::all_cards) | Every readable card, sorted by slug |
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Persist a card and return its manifest entry.
    async fn put(&self, card: &ConceptCard) -> Result<ManifestEntry>;

    /// Read a card. `Ok(None)` if the slug has no manifest entry.
    ///
    /// Fails with [`StoreError::NotReady`] if the manifest entry exists but
    /// the card body does not.
    async fn get(&self, slug: &str) -> Result<Option<ConceptCard>>;

    /// All manifest entries, sorted by slug.
    async fn list(&self) -> Result<Vec<ManifestEntry>>;

    /// Remove both records. Returns whether anything was removed.
    async fn delete(&self, slug: &str) -> Result<bool>;

    /// Remove manifest entries without a card and cards without a manifest
    /// entry. Returns the affected slugs, sorted.
    async fn gc(&self) -> Result<Vec<String>>;

    /// Load every card listed in the manifest, skipping ones not ready yet.
    async fn all_cards(&self) -> Result<Vec<ConceptCard>> {
        let mut cards = Vec::new();
        for entry in self.list().await? {
            match self.get(&entry.slug).await {
                Ok(Some(card)) => cards.push(card),
                Ok(None) => {}
                Err(e) if is_not_ready(&e) => {
                    tracing::debug!(slug = %entry.slug, "skipping card that is not ready");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(cards)
    }
}

/// True if `err` wraps a [`StoreError::NotReady`].
pub fn is_not_ready(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StoreError>()
        .is_some_and(StoreError::is_transient)
}
