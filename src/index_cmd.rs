//! `netref index` commands over the persisted index manifest.
//!
//! The index itself is rebuilt from the corpus on every run; what persists
//! is the manifest `{index_hash, section_count, corpus_hash, built_at}`.
//! `verify` compares the stored manifest with the live corpus so callers can
//! tell whether compiled cards were built against the current snapshot.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use netref_core::index::Index;
use netref_core::models::IndexManifest;

use crate::config::Config;
use crate::sqlite_store::SqliteCardStore;
use crate::{corpus, db, migrate};

async fn open_store(config: &Config) -> Result<SqliteCardStore> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteCardStore::new(pool))
}

fn load(config: &Config) -> Result<(Index, String)> {
    corpus::build_index(&config.corpus)
        .with_context(|| format!("Failed to load corpus: {}", config.corpus.path.display()))
}

/// Build the index from the corpus and persist its manifest.
pub async fn run_build(config: &Config) -> Result<IndexManifest> {
    let (index, corpus_hash) = load(config)?;
    let manifest = IndexManifest {
        index_hash: index.hash().to_string(),
        section_count: index.section_count(),
        corpus_hash,
        built_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let store = open_store(config).await?;
    store.put_index_manifest(&manifest).await?;
    store.pool().close().await;

    println!("Index built.");
    println!("  sections:    {}", manifest.section_count);
    println!("  documents:   {}", index.documents().len());
    println!("  index_hash:  {}", manifest.index_hash);
    println!("  corpus_hash: {}", manifest.corpus_hash);
    Ok(manifest)
}

/// Result of comparing the stored manifest with the live corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub stored: Option<IndexManifest>,
    pub live_index_hash: String,
    pub live_section_count: usize,
    pub live_corpus_hash: String,
    pub mismatches: Vec<String>,
}

impl Verification {
    pub fn ok(&self) -> bool {
        self.stored.is_some() && self.mismatches.is_empty()
    }
}

pub fn compare(stored: Option<IndexManifest>, index: &Index, corpus_hash: &str) -> Verification {
    let mut mismatches = Vec::new();
    if let Some(m) = &stored {
        if m.index_hash != index.hash() {
            mismatches.push(format!(
                "index_hash: stored {} live {}",
                m.index_hash,
                index.hash()
            ));
        }
        if m.section_count != index.section_count() {
            mismatches.push(format!(
                "section_count: stored {} live {}",
                m.section_count,
                index.section_count()
            ));
        }
        if m.corpus_hash != corpus_hash {
            mismatches.push(format!(
                "corpus_hash: stored {} live {}",
                m.corpus_hash, corpus_hash
            ));
        }
    }
    Verification {
        stored,
        live_index_hash: index.hash().to_string(),
        live_section_count: index.section_count(),
        live_corpus_hash: corpus_hash.to_string(),
        mismatches,
    }
}

/// Compare the stored manifest with the live corpus. Returns whether they match.
pub async fn run_verify(config: &Config) -> Result<bool> {
    let (index, corpus_hash) = load(config)?;
    let store = open_store(config).await?;
    let stored = store.index_manifest().await?;
    store.pool().close().await;

    let v = compare(stored, &index, &corpus_hash);
    match &v.stored {
        None => println!("No index manifest. Run `netref index build`."),
        Some(_) if v.ok() => {
            println!("Index manifest OK.");
            println!("  index_hash: {}", v.live_index_hash);
        }
        Some(_) => {
            println!("Index manifest is out of date:");
            for m in &v.mismatches {
                println!("  {}", m);
            }
        }
    }
    Ok(v.ok())
}

/// Print index statistics.
pub async fn run_stats(config: &Config) -> Result<()> {
    let (index, corpus_hash) = load(config)?;
    let store = open_store(config).await?;
    let stored = store.index_manifest().await?;
    store.pool().close().await;

    let dense = (0..index.section_count())
        .filter(|&p| index.dense_vector(p).is_some())
        .count();

    println!("Index");
    println!("  sections:     {}", index.section_count());
    println!("  documents:    {}", index.documents().len());
    println!("  vocabulary:   {}", index.vocabulary_size());
    println!("  avg length:   {:.1}", index.avg_len());
    println!("  dense:        {} / {}", dense, index.section_count());
    println!("  index_hash:   {}", index.hash());
    println!("  corpus_hash:  {}", corpus_hash);
    match stored {
        Some(m) => println!("  built_at:     {}", m.built_at),
        None => println!("  built_at:     never"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netref_core::models::SectionRecord;

    fn index() -> Index {
        Index::build(vec![SectionRecord {
            rfc_number: 826,
            section: "1".into(),
            title: "Introduction".into(),
            text: "ARP maps addresses.".into(),
        }])
        .unwrap()
    }

    #[test]
    fn compare_reports_each_mismatch() {
        let idx = index();
        let good = IndexManifest {
            index_hash: idx.hash().to_string(),
            section_count: 1,
            corpus_hash: "c".into(),
            built_at: "t".into(),
        };
        assert!(compare(Some(good.clone()), &idx, "c").ok());

        let v = compare(Some(good), &idx, "other");
        assert!(!v.ok());
        assert_eq!(v.mismatches.len(), 1);
        assert!(v.mismatches[0].starts_with("corpus_hash"));

        assert!(!compare(None, &idx, "c").ok());
    }
}
