//! Index and card store overview.
//!
//! Provides a quick summary of what is loaded: section and document counts,
//! whether the persisted index manifest matches the live corpus, and how
//! many stored concept cards are stale. Used by `netref stats`.

use anyhow::Result;

use crate::config::Config;
use crate::engine::Engine;
use crate::sqlite_store::SqliteCardStore;

/// Run the stats command and print a summary.
pub async fn run_stats(config: &Config, engine: &Engine, store: &SqliteCardStore) -> Result<()> {
    let index = engine.index();
    let manifest = store.index_manifest().await?;
    let entries = engine.list_cards().await?;
    let stale = engine.stale_cards().await?.len();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("netref stats");
    println!("============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Sections:    {}", index.section_count());
    println!("  Documents:   {}", index.documents().len());
    println!("  Index hash:  {}", index.hash());
    let manifest_state = match &manifest {
        None => "not built".to_string(),
        Some(m) if m.index_hash == index.hash() => format!("current (built {})", m.built_at),
        Some(m) => format!("out of date (built {})", m.built_at),
    };
    println!("  Manifest:    {}", manifest_state);
    println!();
    println!("  Cards:       {}", entries.len());
    println!("  Stale:       {}", stale);
    println!("  Root hash:   {}", engine.root_hash().await?);
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
