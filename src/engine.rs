//! The netref engine: one handle over the index, lexicon, card store and
//! response cache.
//!
//! [`Engine`] is cheap to clone (every field is behind an `Arc`) so bulk
//! compiles can hand a copy to each spawned task. Ranking and routing are
//! synchronous and pure; anything that touches the card store is async.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`route`](Engine::route) | Classify a query and resolve its target |
//! | [`score`](Engine::score) | Rank sections, through the response cache |
//! | [`ask`](Engine::ask) | Route, then answer with a definition, card, or case |
//! | [`compile_concept`](Engine::compile_concept) | Compile one card, optionally save and pull |
//! | [`compile_many`](Engine::compile_many) | Bounded-concurrency bulk compile |
//! | [`get_card`](Engine::get_card) | Stored card plus its stale flag |
//! | [`diff_concept`](Engine::diff_concept) | Structural diff against the stored card |
//! | [`validate_links`](Engine::validate_links) | Missing links and cycles |
//! | [`list_tags`](Engine::list_tags) / [`search_concepts`](Engine::search_concepts) | Catalog queries |
//! | [`list_cards`](Engine::list_cards) / [`delete_card`](Engine::delete_card) / [`gc`](Engine::gc) / [`root_hash`](Engine::root_hash) | Manifest maintenance |

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;

use netref_core::card::{normalize_slug, ConceptCard};
use netref_core::catalog::{root_hash, search_cards, tag_counts, ConceptHit, TagCount};
use netref_core::compile::{compile_card, CardLinks, CompileParams};
use netref_core::define::{assemble_definition, DefinitionAnswer};
use netref_core::diff::{diff_cards, CardDiff};
use netref_core::error::{CompileError, ErrorCode, NotFoundError};
use netref_core::index::Index;
use netref_core::lexicon::Lexicon;
use netref_core::links::{validate_links, Adjacency, LinkReport};
use netref_core::rank::{score_query, RankMode, RankParams, ScoredHit, Scope};
use netref_core::router::{Intent, RouteContext, RouteTarget, Router, RouterDecision};
use netref_core::store::{is_not_ready, CardStore, ManifestEntry};

use crate::cache::{QueryKey, ResponseCache};
use crate::config::Config;
use crate::progress::{CompileProgressEvent, CompileProgressReporter};
use crate::sqlite_store::SqliteCardStore;
use crate::{corpus, db, migrate};

/// Engine tuning, resolved from [`Config`] or built directly in tests.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mode: RankMode,
    pub rank: RankParams,
    pub compile: CompileParams,
    pub final_limit: usize,
    pub pool_size: usize,
    /// `None` disables the response cache.
    pub cache_ttl: Option<Duration>,
    pub cache_max_entries: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: RankMode::Hybrid,
            rank: RankParams::default(),
            compile: CompileParams::default(),
            final_limit: 10,
            pool_size: 4,
            cache_ttl: Some(Duration::from_secs(300)),
            cache_max_entries: 512,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let rank = config.retrieval.rank_params();
        Ok(Self {
            mode: config.retrieval.rank_mode()?,
            compile: config.concepts.compile_params(rank.clone())?,
            rank,
            final_limit: config.retrieval.final_limit,
            pool_size: config.concepts.pool_size,
            cache_ttl: (config.cache.enabled && config.cache.ttl_secs > 0)
                .then(|| Duration::from_secs(config.cache.ttl_secs)),
            cache_max_entries: config.cache.max_entries,
        })
    }
}

/// Caller options for a compile.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Persist the card and its manifest entry.
    pub save: bool,
    /// Also compile each related slug, one level deep.
    pub pull: bool,
    /// Overrides the stored card's and the lexicon's related slugs.
    pub related: Option<Vec<String>>,
    /// Overrides the stored card's and the lexicon's tags.
    pub tags: Option<Vec<String>>,
}

/// A related slug that failed to compile during pull-through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullError {
    pub slug: String,
    pub code: Option<ErrorCode>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileOutcome {
    pub card: ConceptCard,
    /// Present when the card has related slugs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<LinkReport>,
    pub saved: bool,
    pub sha256: String,
    pub pulled: Vec<String>,
    pub pulled_errors: Vec<PullError>,
}

/// One slug's entry in a bulk compile result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItem {
    pub slug: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub ok: bool,
    /// One entry per input slug, in input order.
    pub results: Vec<BulkItem>,
    pub saved_count: usize,
}

/// A stored card and whether it was compiled against another index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub card: ConceptCard,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    Definition(DefinitionAnswer),
    Concept {
        card: ConceptCard,
        stale: bool,
        /// False when the card was compiled on the fly and not saved.
        stored: bool,
    },
    /// Handed to the external troubleshooting engine.
    Troubleshoot { case: String, context: RouteContext },
    NoAnswer { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub decision: RouterDecision,
    pub answer: Answer,
}

/// The [`CompileError`] inside `err`, if it is one.
pub fn compile_error(err: &anyhow::Error) -> Option<&CompileError> {
    err.downcast_ref::<CompileError>()
}

/// Short label for progress lines: the compile code, or `ERROR`.
fn error_label(err: &anyhow::Error) -> String {
    compile_error(err)
        .map(|e| e.code.as_str().to_string())
        .unwrap_or_else(|| "ERROR".to_string())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Clone)]
pub struct Engine {
    index: Arc<Index>,
    lexicon: Arc<Lexicon>,
    store: Arc<dyn CardStore>,
    settings: Arc<EngineSettings>,
    cache: Option<Arc<ResponseCache<Vec<ScoredHit>>>>,
}

impl Engine {
    pub fn new(
        index: Index,
        lexicon: Lexicon,
        store: Arc<dyn CardStore>,
        settings: EngineSettings,
    ) -> Self {
        let cache = settings
            .cache_ttl
            .map(|ttl| Arc::new(ResponseCache::new(ttl, settings.cache_max_entries)));
        Self {
            index: Arc::new(index),
            lexicon: Arc::new(lexicon),
            store,
            settings: Arc::new(settings),
            cache,
        }
    }

    /// Open the engine described by `config`: build the index from the
    /// corpus, migrate the database, and attach the SQLite card store.
    ///
    /// The store is also returned for index-manifest access.
    pub async fn open(config: &Config) -> Result<(Self, Arc<SqliteCardStore>)> {
        let settings = EngineSettings::from_config(config)?;
        let lexicon = config.router.load_lexicon()?;
        let (index, _corpus_hash) = corpus::build_index(&config.corpus)
            .with_context(|| format!("Failed to load corpus: {}", config.corpus.path.display()))?;

        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let store = Arc::new(SqliteCardStore::new(pool));

        if let Some(manifest) = store.index_manifest().await? {
            if manifest.index_hash != index.hash() {
                tracing::warn!(
                    stored = %manifest.index_hash,
                    live = %index.hash(),
                    "index manifest is out of date; run `netref index build`"
                );
            }
        }

        let engine = Self::new(index, lexicon, store.clone(), settings);
        Ok((engine, store))
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A handle sharing this engine's index, store and cache, with a
    /// different bulk compile concurrency.
    pub fn with_pool_size(&self, pool_size: usize) -> Self {
        let mut settings = (*self.settings).clone();
        settings.pool_size = pool_size.max(1);
        Self {
            settings: Arc::new(settings),
            ..self.clone()
        }
    }

    // ── Retrieval ──────────────────────────────────────────────────────

    /// Classify `query`. Stored card slugs count as known concepts.
    pub async fn route(&self, query: &str, context: &RouteContext) -> Result<RouterDecision> {
        let slugs: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|e| e.slug)
            .collect();
        let decision = Router::new(&self.index, &self.lexicon, &self.settings.rank)
            .with_known_slugs(slugs)
            .route(query, context);
        tracing::debug!(
            intent = decision.intent.as_str(),
            target = ?decision.target,
            confidence = decision.confidence,
            "routed query"
        );
        Ok(decision)
    }

    /// Rank sections in `scope`, truncated to `limit`.
    ///
    /// Results are cached by normalized query, mode, scope, and limit. A
    /// cached result is identical to a fresh computation.
    pub fn score(&self, query: &str, mode: RankMode, scope: Scope, limit: usize) -> Vec<ScoredHit> {
        let key = QueryKey::new(query, mode, scope, limit);
        if let Some(cache) = &self.cache {
            if let Some(hits) = cache.get(&key) {
                tracing::debug!(query = %key.query, mode = %mode, "cache hit");
                return hits;
            }
        }

        let mut hits = score_query(&self.index, query, mode, scope, &self.settings.rank, None);
        hits.truncate(limit);

        if let Some(cache) = &self.cache {
            cache.insert(key, hits.clone());
        }
        hits
    }

    /// Route `query` and answer it from the corpus or the card store.
    pub async fn ask(&self, query: &str, context: &RouteContext) -> Result<AskResponse> {
        let decision = self.route(query, context).await?;

        let answer = match (decision.intent, &decision.target) {
            (_, None) => Answer::NoAnswer {
                reason: decision.rationale.clone(),
            },
            (Intent::Troubleshoot, Some(RouteTarget::Case(case))) => Answer::Troubleshoot {
                case: case.clone(),
                context: decision.context.clone().unwrap_or_default(),
            },
            (Intent::Concept, Some(RouteTarget::Concept(slug))) => self.concept_answer(slug).await?,
            (_, Some(RouteTarget::Document(rfc))) => {
                let hits = self.score(
                    query,
                    self.settings.mode,
                    Scope::Document(*rfc),
                    self.settings.final_limit,
                );
                match assemble_definition(&self.index, &decision, &hits) {
                    Some(def) => Answer::Definition(def),
                    None => Answer::NoAnswer {
                        reason: format!("no section of RFC {} matches the query", rfc),
                    },
                }
            }
            (intent, Some(target)) => Answer::NoAnswer {
                reason: format!("{} decision with unexpected target {}", intent.as_str(), target),
            },
        };

        Ok(AskResponse { decision, answer })
    }

    async fn concept_answer(&self, slug: &str) -> Result<Answer> {
        if let Some(card) = self.store.get(slug).await? {
            let stale = card.is_stale(self.index.hash());
            return Ok(Answer::Concept {
                card,
                stale,
                stored: true,
            });
        }
        match self.compile_one(slug, &CompileOptions::default()).await {
            Ok(outcome) => Ok(Answer::Concept {
                card: outcome.card,
                stale: false,
                stored: false,
            }),
            Err(e) => match compile_error(&e) {
                Some(ce) => Ok(Answer::NoAnswer {
                    reason: ce.to_string(),
                }),
                None => Err(e),
            },
        }
    }

    // ── Compilation ────────────────────────────────────────────────────

    /// Compile one concept card.
    ///
    /// Failures carrying a [`CompileError`] are expected outcomes; use
    /// [`compile_error`] to get at the code. With `pull`, each related slug
    /// is compiled too (without further pulling), and its failures are
    /// collected rather than returned.
    pub async fn compile_concept(&self, raw_slug: &str, opts: CompileOptions) -> Result<CompileOutcome> {
        let mut outcome = self.compile_one(raw_slug, &opts).await?;

        if opts.pull {
            let child = CompileOptions {
                save: opts.save,
                ..CompileOptions::default()
            };
            for related in outcome.card.related.clone() {
                match self.compile_one(&related, &child).await {
                    Ok(_) => outcome.pulled.push(related),
                    Err(e) => {
                        let (code, message) = match compile_error(&e) {
                            Some(ce) => (Some(ce.code), ce.message.clone()),
                            None => (None, format!("{:#}", e)),
                        };
                        tracing::warn!(slug = %related, error = %message, "pull-through compile failed");
                        outcome.pulled_errors.push(PullError {
                            slug: related,
                            code,
                            message,
                        });
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn compile_one(&self, raw_slug: &str, opts: &CompileOptions) -> Result<CompileOutcome> {
        let slug = normalize_slug(raw_slug)?;
        let links = self.resolve_links(&slug, opts).await?;
        let card = compile_card(
            &self.index,
            &self.lexicon,
            &self.settings.compile,
            &slug,
            links,
            &now_rfc3339(),
        )?;

        let links = if card.related.is_empty() {
            None
        } else {
            Some(self.check_links(&card).await?)
        };

        let (saved, sha256) = if opts.save {
            let entry = self.store.put(&card).await?;
            (true, entry.sha256)
        } else {
            (false, card.content_hash()?)
        };

        tracing::info!(slug = %card.slug, saved, claims = card.claims.len(), "compiled concept");
        Ok(CompileOutcome {
            card,
            links,
            saved,
            sha256,
            pulled: Vec::new(),
            pulled_errors: Vec::new(),
        })
    }

    /// Related slugs and tags: caller options, else the stored card, else
    /// the lexicon defaults. Each field is resolved independently.
    async fn resolve_links(&self, slug: &str, opts: &CompileOptions) -> Result<CardLinks> {
        let stored = if opts.related.is_none() || opts.tags.is_none() {
            match self.store.get(slug).await {
                Ok(card) => card,
                Err(e) if is_not_ready(&e) => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let related = opts
            .related
            .clone()
            .or_else(|| stored.as_ref().map(|c| c.related.clone()))
            .or_else(|| self.lexicon.related.get(slug).cloned())
            .unwrap_or_default();
        let tags = opts
            .tags
            .clone()
            .or_else(|| stored.as_ref().map(|c| c.tags.clone()))
            .or_else(|| self.lexicon.tags.get(slug).cloned())
            .unwrap_or_default();
        Ok(CardLinks { related, tags })
    }

    /// True if `slug` would compile against the live index.
    fn compilable(&self, slug: &str) -> bool {
        compile_card(
            &self.index,
            &self.lexicon,
            &self.settings.compile,
            slug,
            CardLinks::default(),
            "",
        )
        .is_ok()
    }

    /// Validate `card`'s links against the stored graph plus `card` itself.
    async fn check_links(&self, card: &ConceptCard) -> Result<LinkReport> {
        let mut adjacency: Adjacency = self
            .store
            .all_cards()
            .await?
            .into_iter()
            .map(|c| (c.slug, c.related))
            .collect();
        adjacency.insert(card.slug.clone(), card.related.clone());
        let known: BTreeSet<String> = adjacency.keys().cloned().collect();

        let report = validate_links(&card.slug, &adjacency, |s| {
            known.contains(s) || self.compilable(s)
        });
        if !report.ok {
            tracing::warn!(
                slug = %card.slug,
                missing = ?report.missing,
                cycles = report.cycles.len(),
                "concept link problems"
            );
        }
        Ok(report)
    }

    /// Compile `slugs` with at most `pool_size` compiles in flight.
    ///
    /// Every input slug gets exactly one result, in input order. One slug's
    /// failure never affects another's.
    pub async fn compile_many(
        &self,
        slugs: Vec<String>,
        opts: CompileOptions,
        reporter: Arc<dyn CompileProgressReporter>,
    ) -> BulkOutcome {
        let total = slugs.len() as u64;
        reporter.report(CompileProgressEvent::Started { total });

        let semaphore = Arc::new(Semaphore::new(self.settings.pool_size.max(1)));
        let done = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(slugs.len());
        for slug in &slugs {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            let done = done.clone();
            let reporter = reporter.clone();
            let opts = opts.clone();
            let slug = slug.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let result = engine.compile_concept(&slug, opts).await;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.report(CompileProgressEvent::Finished {
                    slug,
                    n,
                    total,
                    error: result.as_ref().err().map(error_label),
                });
                result
            }));
        }

        let mut results = Vec::with_capacity(slugs.len());
        for (slug, handle) in slugs.into_iter().zip(handles) {
            let item = match handle.await {
                Ok(Ok(outcome)) => BulkItem {
                    slug,
                    ok: true,
                    code: None,
                    message: None,
                    saved: outcome.saved,
                    card_sha256: Some(outcome.sha256),
                },
                Ok(Err(e)) => BulkItem {
                    slug,
                    ok: false,
                    code: compile_error(&e).map(|ce| ce.code),
                    message: Some(
                        compile_error(&e)
                            .map(|ce| ce.message.clone())
                            .unwrap_or_else(|| format!("{:#}", e)),
                    ),
                    saved: false,
                    card_sha256: None,
                },
                Err(join) => BulkItem {
                    slug,
                    ok: false,
                    code: None,
                    message: Some(format!("compile task failed: {}", join)),
                    saved: false,
                    card_sha256: None,
                },
            };
            results.push(item);
        }

        let saved_count = results.iter().filter(|r| r.saved).count();
        BulkOutcome {
            ok: true,
            results,
            saved_count,
        }
    }

    // ── Stored cards ───────────────────────────────────────────────────

    /// Read a stored card. A missing card is a [`NotFoundError`].
    pub async fn get_card(&self, raw_slug: &str) -> Result<CardView> {
        let slug = normalize_slug(raw_slug)?;
        let card = self
            .store
            .get(&slug)
            .await?
            .ok_or_else(|| NotFoundError(slug.clone()))?;
        let stale = card.is_stale(self.index.hash());
        Ok(CardView { card, stale })
    }

    /// Diff the stored card against a fresh compile (`recompile`) or against
    /// itself.
    pub async fn diff_concept(&self, raw_slug: &str, recompile: bool) -> Result<CardDiff> {
        let old = self.get_card(raw_slug).await?.card;
        let new = if recompile {
            let links = CardLinks {
                related: old.related.clone(),
                tags: old.tags.clone(),
            };
            compile_card(
                &self.index,
                &self.lexicon,
                &self.settings.compile,
                &old.slug,
                links,
                &now_rfc3339(),
            )?
        } else {
            old.clone()
        };
        diff_cards(&old, &new, self.index.hash()).context("Failed to diff concept cards")
    }

    /// Validate the stored card's links.
    pub async fn validate_links(&self, raw_slug: &str) -> Result<LinkReport> {
        let card = self.get_card(raw_slug).await?.card;
        self.check_links(&card).await
    }

    /// Slugs of stored cards compiled against a different index.
    pub async fn stale_cards(&self) -> Result<Vec<String>> {
        let live = self.index.hash();
        Ok(self
            .store
            .all_cards()
            .await?
            .into_iter()
            .filter(|c| c.is_stale(live))
            .map(|c| c.slug)
            .collect())
    }

    pub async fn list_tags(&self) -> Result<Vec<TagCount>> {
        Ok(tag_counts(&self.store.all_cards().await?))
    }

    pub async fn search_concepts(&self, query: &str, limit: usize) -> Result<Vec<ConceptHit>> {
        let cards = self.store.all_cards().await?;
        Ok(search_cards(&cards, query, limit, self.index.hash()))
    }

    pub async fn list_cards(&self) -> Result<Vec<ManifestEntry>> {
        self.store.list().await
    }

    pub async fn delete_card(&self, raw_slug: &str) -> Result<bool> {
        let slug = normalize_slug(raw_slug)?;
        let removed = self.store.delete(&slug).await?;
        if removed {
            tracing::info!(slug = %slug, "deleted concept card");
        }
        Ok(removed)
    }

    pub async fn gc(&self) -> Result<Vec<String>> {
        let removed = self.store.gc().await?;
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "cleaned concept manifest");
        }
        Ok(removed)
    }

    /// SHA-256 over the whole manifest.
    pub async fn root_hash(&self) -> Result<String> {
        Ok(root_hash(&self.store.list().await?))
    }
}
