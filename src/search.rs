//! `netref search`, `netref route` and `netref ask`.
//!
//! Output is human-readable text on stdout. Ranked hits with no lexical
//! overlap are scored (they take part in normalization) but not printed.

use anyhow::Result;

use netref_core::rank::{RankMode, ScoredHit, Scope};
use netref_core::router::{RouteContext, RouterDecision};

use crate::engine::{Answer, Engine};

/// Rank sections and print the matching ones.
pub fn run_search(
    engine: &Engine,
    query: &str,
    mode: Option<&str>,
    rfc: Option<u32>,
    limit: Option<usize>,
) -> Result<Vec<ScoredHit>> {
    let mode: RankMode = match mode {
        Some(m) => m.parse()?,
        None => engine.settings().mode,
    };
    let scope = rfc.map(Scope::Document).unwrap_or(Scope::All);
    let limit = limit.unwrap_or(engine.settings().final_limit);

    let hits: Vec<ScoredHit> = engine
        .score(query, mode, scope, limit)
        .into_iter()
        .filter(ScoredHit::matched)
        .collect();

    if hits.is_empty() {
        println!("No results.");
        return Ok(hits);
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] RFC {} §{}  {}",
            i + 1,
            hit.score(mode),
            hit.section.rfc_number,
            hit.section.section,
            hit.section.title
        );
        print!("    tfidf: {:.4}  bm25: {:.4}  hybrid: {:.4}", hit.tfidf, hit.bm25, hit.hybrid);
        if let Some(d) = hit.dense {
            print!("  dense: {:.4}", d);
        }
        println!();
        println!();
    }
    Ok(hits)
}

fn print_decision(decision: &RouterDecision) {
    println!("intent:     {}", decision.intent.as_str());
    match &decision.target {
        Some(t) => println!("target:     {}", t),
        None => println!("target:     (none)"),
    }
    println!("confidence: {:.2}", decision.confidence);
    if !decision.matched_terms.is_empty() {
        println!("matched:    {}", decision.matched_terms.join(", "));
    }
    println!("rationale:  {}", decision.rationale);
    if let Some(ctx) = &decision.context {
        if let Some(v) = &ctx.vendor {
            println!("vendor:     {}", v);
        }
        if let Some(i) = &ctx.interface {
            println!("interface:  {}", i);
        }
        if let Some(a) = &ctx.area {
            println!("area:       {}", a);
        }
    }
}

pub async fn run_route(
    engine: &Engine,
    query: &str,
    context: &RouteContext,
) -> Result<RouterDecision> {
    let decision = engine.route(query, context).await?;
    print_decision(&decision);
    Ok(decision)
}

pub async fn run_ask(
    engine: &Engine,
    query: &str,
    context: &RouteContext,
    json: bool,
) -> Result<()> {
    let response = engine.ask(query, context).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match &response.answer {
        Answer::Definition(def) => {
            println!("{}", def.text);
            println!();
            println!("Source: {}", def.citation);
            println!("  {}", def.url);
            println!("  confidence: {:.2}", def.confidence);
        }
        Answer::Concept { card, stale, stored } => {
            println!("{}", serde_json::to_string_pretty(card)?);
            println!();
            println!(
                "stored: {}  stale: {}",
                if *stored { "yes" } else { "no" },
                if *stale { "yes" } else { "no" }
            );
        }
        Answer::Troubleshoot { case, context } => {
            println!("case: {}", case);
            println!("{}", serde_json::to_string_pretty(context)?);
        }
        Answer::NoAnswer { reason } => {
            println!("No answer.");
            println!("  {}", reason);
        }
    }
    Ok(())
}
