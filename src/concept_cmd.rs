//! `netref concept ...` commands.
//!
//! Cards, diffs and link reports print as pretty JSON on stdout. Listings
//! print as aligned text. Compile failures surface as errors so the process
//! exits non-zero with the error code on stderr.

use std::path::Path;

use anyhow::{Context, Result};

use crate::engine::{CompileOptions, Engine};
use crate::progress::ProgressMode;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Split comma-separated values, dropping empties.
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub async fn run_compile(engine: &Engine, slug: &str, opts: CompileOptions) -> Result<()> {
    let outcome = engine.compile_concept(slug, opts).await?;
    print_json(&outcome)?;
    if let Some(report) = &outcome.links {
        if !report.ok {
            eprintln!(
                "warning: {} missing link(s), {} cycle(s)",
                report.missing.len(),
                report.cycles.len()
            );
        }
    }
    Ok(())
}

/// Read slugs from a file, one per line; `#` starts a comment.
pub fn read_slug_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read slug file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

pub async fn run_compile_many(
    engine: &Engine,
    slugs: Vec<String>,
    opts: CompileOptions,
    concurrency: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    if slugs.is_empty() {
        anyhow::bail!("no slugs given");
    }
    let engine = match concurrency {
        Some(n) => engine.with_pool_size(n),
        None => engine.clone(),
    };
    let total = slugs.len();
    let outcome = engine.compile_many(slugs, opts, progress.reporter()).await;
    print_json(&outcome)?;

    let failed = outcome.results.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        anyhow::bail!("{} of {} concepts failed to compile", failed, total);
    }
    Ok(())
}

pub async fn run_get(engine: &Engine, slug: &str) -> Result<()> {
    let view = engine.get_card(slug).await?;
    print_json(&view)
}

pub async fn run_diff(engine: &Engine, slug: &str, recompile: bool) -> Result<()> {
    let diff = engine.diff_concept(slug, recompile).await?;
    print_json(&diff)
}

pub async fn run_validate(engine: &Engine, slug: &str) -> Result<()> {
    let report = engine.validate_links(slug).await?;
    print_json(&report)
}

pub async fn run_tags(engine: &Engine) -> Result<()> {
    let tags = engine.list_tags().await?;
    if tags.is_empty() {
        println!("No tags.");
        return Ok(());
    }
    println!("{:<24} {:>6}", "TAG", "CARDS");
    for t in &tags {
        println!("{:<24} {:>6}", t.tag, t.count);
    }
    Ok(())
}

pub async fn run_search(engine: &Engine, query: &str, limit: usize) -> Result<()> {
    let hits = engine.search_concepts(query, limit).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, h) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}{}",
            i + 1,
            h.score,
            h.slug,
            if h.stale { "  (stale)" } else { "" }
        );
        if !h.tags.is_empty() {
            println!("    tags: {}", h.tags.join(", "));
        }
    }
    Ok(())
}

pub async fn run_list(engine: &Engine) -> Result<()> {
    let entries = engine.list_cards().await?;
    if entries.is_empty() {
        println!("No concept cards.");
        return Ok(());
    }
    println!("{:<24} {:>8}  {:<20}  {}", "SLUG", "BYTES", "BUILT", "SHA256");
    println!("{}", "-".repeat(76));
    for e in &entries {
        println!(
            "{:<24} {:>8}  {:<20}  {}",
            e.slug,
            e.bytes,
            e.built_at,
            &e.sha256[..e.sha256.len().min(12)]
        );
    }
    println!();
    println!("root: {}", engine.root_hash().await?);
    Ok(())
}

pub async fn run_delete(engine: &Engine, slug: &str) -> Result<()> {
    if engine.delete_card(slug).await? {
        println!("Deleted {}.", slug);
        Ok(())
    } else {
        anyhow::bail!("concept card not found: {}", slug)
    }
}

pub async fn run_gc(engine: &Engine) -> Result<()> {
    let removed = engine.gc().await?;
    if removed.is_empty() {
        println!("Nothing to clean.");
    } else {
        println!(
            "Removed {} orphaned entr{}:",
            removed.len(),
            if removed.len() == 1 { "y" } else { "ies" }
        );
        for slug in &removed {
            println!("  {}", slug);
        }
    }
    Ok(())
}
