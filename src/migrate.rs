use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the netref tables if they do not exist.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Card bodies, keyed by slug
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concept_cards (
            slug TEXT PRIMARY KEY,
            body BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One manifest row per card, written after the card row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concept_manifest (
            slug TEXT PRIMARY KEY,
            sha256 TEXT NOT NULL,
            bytes INTEGER NOT NULL,
            built_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Singleton row describing the last index build
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            index_hash TEXT NOT NULL,
            section_count INTEGER NOT NULL,
            corpus_hash TEXT NOT NULL,
            built_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
