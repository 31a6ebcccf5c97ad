//! Library-level tests for the netref engine.
//!
//! Each test builds a small RFC corpus in a temp directory, indexes it, and
//! drives [`Engine`] over an in-memory card store.

use std::fs;
use std::sync::Arc;

use netref::config::{Config, CorpusConfig};
use netref::corpus::build_index;
use netref::engine::{compile_error, Answer, CompileOptions, Engine, EngineSettings};
use netref::progress::NoProgress;
use netref_core::error::{ErrorCode, NotFoundError};
use netref_core::index::Index;
use netref_core::lexicon::Lexicon;
use netref_core::rank::{normalize_scores, RankMode, Scope};
use netref_core::router::{Intent, RouteContext, RouteTarget};
use netref_core::store::memory::InMemoryCardStore;
use netref_core::store::CardStore;
use serde_json::json;
use tempfile::TempDir;

// ─── Fixtures ───────────────────────────────────────────────────────

fn sections() -> Vec<serde_json::Value> {
    vec![
        json!({
            "rfc_number": 826,
            "section": "1",
            "title": "Introduction",
            "text": "The Address Resolution Protocol (ARP) maps protocol addresses to local \
                     network hardware addresses. ARP requests are broadcast on the local network."
        }),
        json!({
            "rfc_number": 2328,
            "section": "1",
            "title": "Introduction",
            "text": "OSPF is a link-state routing protocol. OSPF routers flood link state \
                     advertisements within an area."
        }),
        json!({
            "rfc_number": 2328,
            "section": "2",
            "title": "The Link-state Database",
            "text": "Each OSPF router maintains an identical link-state database describing \
                     the autonomous system topology."
        }),
        json!({
            "rfc_number": 791,
            "section": "1",
            "title": "Overview",
            "text": "The Internet Protocol (IP) provides datagram delivery between hosts. \
                     IP addresses identify network interfaces."
        }),
        json!({
            "rfc_number": 9293,
            "section": "1",
            "title": "Purpose",
            "text": "TCP provides reliable ordered byte streams between applications."
        }),
    ]
}

fn write_corpus(tmp: &TempDir, records: &[serde_json::Value]) -> CorpusConfig {
    let path = tmp.path().join("sections.jsonl");
    let body: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    fs::write(&path, body.join("\n")).unwrap();
    CorpusConfig {
        path,
        vectors: None,
    }
}

fn index_of(records: &[serde_json::Value]) -> Index {
    let tmp = TempDir::new().unwrap();
    let (index, _) = build_index(&write_corpus(&tmp, records)).unwrap();
    index
}

fn engine_with(store: Arc<InMemoryCardStore>, settings: EngineSettings) -> Engine {
    Engine::new(index_of(&sections()), Lexicon::default(), store, settings)
}

fn engine() -> (Engine, Arc<InMemoryCardStore>) {
    let store = Arc::new(InMemoryCardStore::new());
    (engine_with(store.clone(), EngineSettings::default()), store)
}

fn save() -> CompileOptions {
    CompileOptions {
        save: true,
        ..CompileOptions::default()
    }
}

// ─── Routing and ranking ────────────────────────────────────────────

#[tokio::test]
async fn what_is_arp_routes_to_rfc_826() {
    let (engine, _) = engine();

    let decision = engine
        .route("what is arp", &RouteContext::default())
        .await
        .unwrap();
    assert_eq!(decision.intent, Intent::Define);
    assert_eq!(decision.target, Some(RouteTarget::Document(826)));

    let hits = engine.score("what is arp", RankMode::Hybrid, Scope::All, 10);
    assert_eq!(hits[0].section.rfc_number, 826);
}

#[tokio::test]
async fn ask_returns_cited_definition() {
    let (engine, _) = engine();

    let response = engine
        .ask("what is arp", &RouteContext::default())
        .await
        .unwrap();
    match response.answer {
        Answer::Definition(def) => {
            assert_eq!(def.rfc_number, 826);
            assert!(def.citation.starts_with("RFC 826, Section 1"));
            assert!(def.text.contains("ARP"));
        }
        other => panic!("expected a definition, got {:?}", other),
    }
}

#[tokio::test]
async fn ask_about_stored_concept_returns_card() {
    let (engine, _) = engine();
    engine.compile_concept("arp", save()).await.unwrap();

    let response = engine.ask("arp", &RouteContext::default()).await.unwrap();
    assert_eq!(response.decision.intent, Intent::Concept);
    match response.answer {
        Answer::Concept { card, stale, stored } => {
            assert_eq!(card.slug, "arp");
            assert!(stored);
            assert!(!stale);
        }
        other => panic!("expected a concept card, got {:?}", other),
    }
}

#[test]
fn hybrid_score_matches_hand_computation() {
    let (engine, _) = engine();
    let hits = engine.score("ospf link state", RankMode::Hybrid, Scope::Document(2328), 10);
    assert_eq!(hits.len(), 2);

    let tfidf = normalize_scores(&hits.iter().map(|h| h.tfidf).collect::<Vec<_>>());
    let bm25 = normalize_scores(&hits.iter().map(|h| h.bm25).collect::<Vec<_>>());
    for (i, hit) in hits.iter().enumerate() {
        let expected = 0.6 * tfidf[i] + 0.4 * bm25[i];
        assert!(
            (hit.hybrid - expected).abs() < 1e-12,
            "hit {}: hybrid {} != {}",
            i,
            hit.hybrid,
            expected
        );
    }
    assert!(hits[0].hybrid >= hits[1].hybrid);
}

#[test]
fn cached_scores_equal_fresh_computation() {
    let (cached, _) = engine();
    let uncached = engine_with(
        Arc::new(InMemoryCardStore::new()),
        EngineSettings {
            cache_ttl: None,
            ..EngineSettings::default()
        },
    );

    let first = cached.score("link state routing", RankMode::Bm25, Scope::All, 5);
    let again = cached.score("  Link   STATE routing ", RankMode::Bm25, Scope::All, 5);
    let fresh = uncached.score("link state routing", RankMode::Bm25, Scope::All, 5);
    assert_eq!(first, again);
    assert_eq!(first, fresh);
}

#[test]
fn zero_cache_ttl_disables_cache() {
    let config: Config = toml::from_str(
        "[db]\npath = \"x.sqlite\"\n[corpus]\npath = \"s.jsonl\"\n[cache]\nttl_secs = 0\nmax_entries = 8\n",
    )
    .unwrap();
    let settings = EngineSettings::from_config(&config).unwrap();
    assert_eq!(settings.cache_ttl, None);
    assert_eq!(settings.cache_max_entries, 8);
}

// ─── Compilation ────────────────────────────────────────────────────

#[tokio::test]
async fn compile_arp_cites_rfc_826() {
    let (engine, _) = engine();
    let outcome = engine
        .compile_concept("arp", CompileOptions::default())
        .await
        .unwrap();

    let card = &outcome.card;
    assert_eq!(card.id, "concept:arp:v1");
    assert_eq!(card.definition.rfc_number, 826);
    assert_eq!(card.claims.len(), 1);
    assert_eq!(card.claims[0].evidence.len(), 1);
    assert_eq!(card.provenance.index_hash, engine.index().hash());
    assert_eq!(card.related, vec!["ip"]);
    assert_eq!(card.tags, vec!["addressing", "l2"]);
    assert!(!outcome.saved);
    assert_eq!(outcome.sha256, card.content_hash().unwrap());
}

#[tokio::test]
async fn compile_unknown_concept_fails_with_code() {
    let (engine, store) = engine();
    let err = engine
        .compile_concept("xyz123nonexistent", save())
        .await
        .unwrap_err();
    let code = compile_error(&err).map(|e| e.code);
    assert!(
        matches!(code, Some(ErrorCode::LowConfidence) | Some(ErrorCode::NoMatch)),
        "unexpected error: {:#}",
        err
    );
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_slug_is_bad_card() {
    let (engine, _) = engine();
    let err = engine
        .compile_concept("arp/../etc", CompileOptions::default())
        .await
        .unwrap_err();
    assert_eq!(compile_error(&err).map(|e| e.code), Some(ErrorCode::BadCard));
}

#[tokio::test]
async fn saved_card_round_trips_through_store() {
    let (engine, store) = engine();
    let outcome = engine.compile_concept("ARP", save()).await.unwrap();
    assert!(outcome.saved);

    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].slug, "arp");
    assert_eq!(entries[0].sha256, outcome.sha256);

    let view = engine.get_card("arp").await.unwrap();
    assert_eq!(view.card, outcome.card);
    assert!(!view.stale);
}

#[tokio::test]
async fn pull_compiles_related_one_level_and_collects_errors() {
    let (engine, store) = engine();
    let opts = CompileOptions {
        save: true,
        pull: true,
        related: Some(vec!["ospf".into(), "zzzunknown".into()]),
        tags: None,
    };
    let outcome = engine.compile_concept("arp", opts).await.unwrap();

    assert_eq!(outcome.pulled, vec!["ospf"]);
    assert_eq!(outcome.pulled_errors.len(), 1);
    assert_eq!(outcome.pulled_errors[0].slug, "zzzunknown");
    assert!(outcome.pulled_errors[0].code.is_some());

    let links = outcome.links.expect("link report");
    assert_eq!(links.missing, vec!["zzzunknown"]);

    // ospf's own related slug (ip) is not pulled.
    let slugs: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.slug)
        .collect();
    assert_eq!(slugs, vec!["arp", "ospf"]);
}

#[tokio::test]
async fn explicit_links_override_stored_ones() {
    let (engine, _) = engine();
    let opts = CompileOptions {
        save: true,
        related: Some(vec!["tcp".into()]),
        tags: Some(vec!["custom".into()]),
        ..CompileOptions::default()
    };
    engine.compile_concept("arp", opts).await.unwrap();

    // A recompile without overrides keeps the stored links.
    let again = engine.compile_concept("arp", save()).await.unwrap();
    assert_eq!(again.card.related, vec!["tcp"]);
    assert_eq!(again.card.tags, vec!["custom"]);
}

#[tokio::test]
async fn bulk_compile_isolates_failures() {
    let (engine, store) = engine();
    let slugs = vec!["arp".to_string(), "ospf".to_string(), "___bogus___".to_string()];
    let outcome = engine
        .compile_many(slugs, save(), Arc::new(NoProgress))
        .await;

    assert!(outcome.ok);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.saved_count, 2);

    let order: Vec<&str> = outcome.results.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(order, vec!["arp", "ospf", "___bogus___"]);
    assert!(outcome.results[0].ok && outcome.results[1].ok);
    assert!(!outcome.results[2].ok);
    assert!(outcome.results[2].code.is_some());
    assert!(outcome.results[2].card_sha256.is_none());
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_compile_with_single_permit_keeps_input_order() {
    let (engine, _) = engine();
    let slugs = vec!["tcp".to_string(), "ip".to_string(), "arp".to_string()];
    let outcome = engine
        .with_pool_size(1)
        .compile_many(slugs.clone(), CompileOptions::default(), Arc::new(NoProgress))
        .await;

    assert!(outcome.results.iter().all(|r| r.ok && !r.saved));
    let order: Vec<String> = outcome.results.iter().map(|r| r.slug.clone()).collect();
    assert_eq!(order, slugs);
    assert_eq!(outcome.saved_count, 0);
}

// ─── Stored cards ───────────────────────────────────────────────────

#[tokio::test]
async fn mutual_links_report_a_cycle() {
    let (engine, _) = engine();
    let link = |to: &str| CompileOptions {
        save: true,
        related: Some(vec![to.to_string()]),
        ..CompileOptions::default()
    };
    engine.compile_concept("arp", link("ospf")).await.unwrap();
    let outcome = engine.compile_concept("ospf", link("arp")).await.unwrap();
    assert!(!outcome.links.as_ref().unwrap().ok);

    let report = engine.validate_links("arp").await.unwrap();
    assert!(!report.ok);
    assert!(report.missing.is_empty());
    assert_eq!(report.cycles, vec![vec!["arp", "ospf", "arp"]]);
}

#[tokio::test]
async fn diff_without_recompile_is_empty() {
    let (engine, _) = engine();
    engine.compile_concept("arp", save()).await.unwrap();

    let diff = engine.diff_concept("arp", false).await.unwrap();
    assert!(diff.is_empty());
    assert!(diff.changed.is_empty() && diff.added.is_empty() && diff.removed.is_empty());
    assert_eq!(diff.old_index_hash, diff.new_index_hash);
    assert!(!diff.stale);
}

#[tokio::test]
async fn card_goes_stale_when_corpus_changes() {
    let store = Arc::new(InMemoryCardStore::new());
    let before = engine_with(store.clone(), EngineSettings::default());
    before.compile_concept("arp", save()).await.unwrap();

    let mut grown = sections();
    grown.push(json!({
        "rfc_number": 826,
        "section": "2",
        "title": "Packet Format",
        "text": "ARP packets carry hardware and protocol address lengths."
    }));
    let after = Engine::new(
        index_of(&grown),
        Lexicon::default(),
        store.clone(),
        EngineSettings::default(),
    );

    assert!(after.get_card("arp").await.unwrap().stale);
    assert_eq!(after.stale_cards().await.unwrap(), vec!["arp"]);

    let diff = after.diff_concept("arp", true).await.unwrap();
    assert!(diff.stale);
    assert_ne!(diff.old_index_hash, diff.new_index_hash);
    assert!(diff.changed.contains_key("provenance.index_hash"));
}

#[tokio::test]
async fn missing_card_is_not_found() {
    let (engine, _) = engine();
    let err = engine.get_card("arp").await.unwrap_err();
    assert!(err.downcast_ref::<NotFoundError>().is_some());
}

#[tokio::test]
async fn catalog_over_stored_cards() {
    let (engine, _) = engine();
    for slug in ["arp", "ip", "ospf"] {
        engine.compile_concept(slug, save()).await.unwrap();
    }

    let tags = engine.list_tags().await.unwrap();
    assert_eq!(tags[0].tag, "addressing");
    assert_eq!(tags[0].count, 2);

    let hits = engine.search_concepts("link state", 10).await.unwrap();
    assert_eq!(hits[0].slug, "ospf");
    assert_eq!(hits[0].id, "concept:ospf:v1");

    let root = engine.root_hash().await.unwrap();
    assert_eq!(root.len(), 64);
    assert!(engine.delete_card("ip").await.unwrap());
    assert!(!engine.delete_card("ip").await.unwrap());
    assert_ne!(engine.root_hash().await.unwrap(), root);
    assert!(engine.gc().await.unwrap().is_empty());
}
