//! SQLite-backed [`CardStore`] and index manifest persistence.
//!
//! Card bodies live in `concept_cards`, their hashes in `concept_manifest`.
//! Both rows are written in one transaction, card first. Reads join the two
//! tables so a manifest row is never returned without its body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use netref_core::card::ConceptCard;
use netref_core::models::IndexManifest;
use netref_core::store::{decode_card, CardStore, ManifestEntry, StoreError};

pub struct SqliteCardStore {
    pool: SqlitePool,
}

impl SqliteCardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The manifest written by the last `index build`, if any.
    pub async fn index_manifest(&self) -> Result<Option<IndexManifest>> {
        let row = sqlx::query(
            "SELECT index_hash, section_count, corpus_hash, built_at FROM index_manifest WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IndexManifest {
            index_hash: r.get("index_hash"),
            section_count: r.get::<i64, _>("section_count") as usize,
            corpus_hash: r.get("corpus_hash"),
            built_at: r.get("built_at"),
        }))
    }

    pub async fn put_index_manifest(&self, manifest: &IndexManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_manifest (id, index_hash, section_count, corpus_hash, built_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                index_hash = excluded.index_hash,
                section_count = excluded.section_count,
                corpus_hash = excluded.corpus_hash,
                built_at = excluded.built_at
            "#,
        )
        .bind(&manifest.index_hash)
        .bind(manifest.section_count as i64)
        .bind(&manifest.corpus_hash)
        .bind(&manifest.built_at)
        .execute(&self.pool)
        .await
        .context("Failed to write index manifest")?;
        Ok(())
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> ManifestEntry {
    ManifestEntry {
        slug: row.get("slug"),
        sha256: row.get("sha256"),
        bytes: row.get::<i64, _>("bytes") as u64,
        built_at: row.get("built_at"),
    }
}

#[async_trait]
impl CardStore for SqliteCardStore {
    async fn put(&self, card: &ConceptCard) -> Result<ManifestEntry> {
        let body = card.canonical_bytes()?;
        let entry = ManifestEntry::for_card(card, &body);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO concept_cards (slug, body) VALUES (?, ?)
            ON CONFLICT(slug) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(&entry.slug)
        .bind(&body)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO concept_manifest (slug, sha256, bytes, built_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                sha256 = excluded.sha256,
                bytes = excluded.bytes,
                built_at = excluded.built_at
            "#,
        )
        .bind(&entry.slug)
        .bind(&entry.sha256)
        .bind(entry.bytes as i64)
        .bind(&entry.built_at)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to save card '{}'", entry.slug))?;
        Ok(entry)
    }

    async fn get(&self, slug: &str) -> Result<Option<ConceptCard>> {
        let row = sqlx::query(
            r#"
            SELECT m.slug, m.sha256, m.bytes, m.built_at, c.body
            FROM concept_manifest m
            LEFT JOIN concept_cards c ON c.slug = m.slug
            WHERE m.slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let entry = entry_from_row(&row);
        let body: Option<Vec<u8>> = row.get("body");
        let body = body.ok_or_else(|| StoreError::NotReady(slug.to_string()))?;
        Ok(Some(decode_card(&entry, &body)?))
    }

    async fn list(&self) -> Result<Vec<ManifestEntry>> {
        let rows = sqlx::query(
            "SELECT slug, sha256, bytes, built_at FROM concept_manifest ORDER BY slug ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let manifest = sqlx::query("DELETE FROM concept_manifest WHERE slug = ?")
            .bind(slug)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let cards = sqlx::query("DELETE FROM concept_cards WHERE slug = ?")
            .bind(slug)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(manifest + cards > 0)
    }

    async fn gc(&self) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let mut removed: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM concept_manifest WHERE slug NOT IN (SELECT slug FROM concept_cards)",
        )
        .fetch_all(&mut *tx)
        .await?;
        let orphans: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM concept_cards WHERE slug NOT IN (SELECT slug FROM concept_manifest)",
        )
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM concept_manifest WHERE slug NOT IN (SELECT slug FROM concept_cards)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM concept_cards WHERE slug NOT IN (SELECT slug FROM concept_manifest)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        removed.extend(orphans);
        removed.sort();
        removed.dedup();
        Ok(removed)
    }
}
