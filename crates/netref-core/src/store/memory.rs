//! In-memory [`CardStore`] implementation for tests.
//!
//! Card bodies and manifest entries share one `std::sync::RwLock`, so a
//! write is observed all at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::card::ConceptCard;

use super::{decode_card, CardStore, ManifestEntry, StoreError};

#[derive(Default)]
struct Inner {
    cards: BTreeMap<String, Vec<u8>>,
    manifest: BTreeMap<String, ManifestEntry>,
}

/// In-memory card store.
pub struct InMemoryCardStore {
    inner: RwLock<Inner>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert a manifest entry with no card body, as a crashed writer would
    /// leave behind.
    pub fn insert_orphan_manifest(&self, entry: ManifestEntry) {
        let mut inner = self.inner.write().unwrap();
        inner.manifest.insert(entry.slug.clone(), entry);
    }

    /// Insert a card body with no manifest entry.
    pub fn insert_orphan_card(&self, slug: &str, body: Vec<u8>) {
        let mut inner = self.inner.write().unwrap();
        inner.cards.insert(slug.to_string(), body);
    }
}

impl Default for InMemoryCardStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn put(&self, card: &ConceptCard) -> Result<ManifestEntry> {
        let body = card.canonical_bytes()?;
        let entry = ManifestEntry::for_card(card, &body);
        let mut inner = self.inner.write().unwrap();
        inner.cards.insert(card.slug.clone(), body);
        inner.manifest.insert(card.slug.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(&self, slug: &str) -> Result<Option<ConceptCard>> {
        let inner = self.inner.read().unwrap();
        let Some(entry) = inner.manifest.get(slug) else {
            return Ok(None);
        };
        let body = inner
            .cards
            .get(slug)
            .ok_or_else(|| StoreError::NotReady(slug.to_string()))?;
        Ok(Some(decode_card(entry, body)?))
    }

    async fn list(&self) -> Result<Vec<ManifestEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.manifest.values().cloned().collect())
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let card = inner.cards.remove(slug).is_some();
        let entry = inner.manifest.remove(slug).is_some();
        Ok(card || entry)
    }

    async fn gc(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.write().unwrap();
        let mut removed = BTreeSet::new();

        let dangling: Vec<String> = inner
            .manifest
            .keys()
            .filter(|s| !inner.cards.contains_key(*s))
            .cloned()
            .collect();
        for slug in dangling {
            inner.manifest.remove(&slug);
            removed.insert(slug);
        }

        let orphans: Vec<String> = inner
            .cards
            .keys()
            .filter(|s| !inner.manifest.contains_key(*s))
            .cloned()
            .collect();
        for slug in orphans {
            inner.cards.remove(&slug);
            removed.insert(slug);
        }

        Ok(removed.into_iter().collect())
    }
}
