use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use netref_core::compile::{CompileParams, TitleMatch};
use netref_core::lexicon::Lexicon;
use netref_core::rank::{RankMode, RankParams};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub concepts: ConceptsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// A JSONL file, or a directory searched recursively for `*.jsonl`.
    pub path: PathBuf,
    /// Optional JSONL of precomputed section vectors.
    #[serde(default)]
    pub vectors: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_b")]
    pub bm25_b: f64,
    #[serde(default = "default_w_tfidf")]
    pub w_tfidf: f64,
    #[serde(default = "default_w_bm25")]
    pub w_bm25: f64,
    #[serde(default)]
    pub use_dense: bool,
    #[serde(default)]
    pub w_dense: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            bm25_k1: default_k1(),
            bm25_b: default_b(),
            w_tfidf: default_w_tfidf(),
            w_bm25: default_w_bm25(),
            use_dense: false,
            w_dense: 0.0,
            final_limit: default_final_limit(),
        }
    }
}

fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_k1() -> f64 {
    1.2
}
fn default_b() -> f64 {
    0.75
}
fn default_w_tfidf() -> f64 {
    0.6
}
fn default_w_bm25() -> f64 {
    0.4
}
fn default_final_limit() -> usize {
    10
}

impl RetrievalConfig {
    pub fn rank_mode(&self) -> Result<RankMode> {
        Ok(self.mode.parse()?)
    }

    pub fn rank_params(&self) -> RankParams {
        RankParams {
            k1: self.bm25_k1,
            b: self.bm25_b,
            w_tfidf: self.w_tfidf,
            w_bm25: self.w_bm25,
            use_dense: self.use_dense,
            w_dense: self.w_dense,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConceptsConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_title_tolerance")]
    pub title_tolerance: f64,
    #[serde(default = "default_preferred_titles")]
    pub preferred_titles: Vec<String>,
    #[serde(default = "default_title_match")]
    pub title_match: String,
    #[serde(default = "default_max_claims")]
    pub max_claims: usize,
    #[serde(default = "default_definition_max_chars")]
    pub definition_max_chars: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for ConceptsConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            title_tolerance: default_title_tolerance(),
            preferred_titles: default_preferred_titles(),
            title_match: default_title_match(),
            max_claims: default_max_claims(),
            definition_max_chars: default_definition_max_chars(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_min_score() -> f64 {
    0.05
}
fn default_title_tolerance() -> f64 {
    0.15
}
fn default_preferred_titles() -> Vec<String> {
    ["introduction", "overview", "terminology", "definitions"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_title_match() -> String {
    "contains".to_string()
}
fn default_max_claims() -> usize {
    3
}
fn default_definition_max_chars() -> usize {
    1000
}
fn default_pool_size() -> usize {
    4
}

impl ConceptsConfig {
    pub fn compile_params(&self, rank: RankParams) -> Result<CompileParams> {
        let title_match: TitleMatch = self
            .title_match
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        Ok(CompileParams {
            min_score: self.min_score,
            title_tolerance: self.title_tolerance,
            preferred_titles: self
                .preferred_titles
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            title_match,
            max_claims: self.max_claims,
            definition_max_chars: self.definition_max_chars,
            rank,
            ..CompileParams::default()
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> u64 {
    512
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RouterConfig {
    /// TOML lexicon override; fields left out keep the built-in vocabulary.
    #[serde(default)]
    pub lexicon: Option<PathBuf>,
}

impl RouterConfig {
    pub fn load_lexicon(&self) -> Result<Lexicon> {
        let Some(path) = &self.lexicon else {
            return Ok(Lexicon::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse lexicon file: {}", path.display()))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    for (name, w) in [
        ("w_tfidf", r.w_tfidf),
        ("w_bm25", r.w_bm25),
        ("w_dense", r.w_dense),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }
    if r.bm25_k1 <= 0.0 {
        anyhow::bail!("retrieval.bm25_k1 must be > 0");
    }
    if !(0.0..=1.0).contains(&r.bm25_b) {
        anyhow::bail!("retrieval.bm25_b must be in [0.0, 1.0]");
    }
    r.rank_mode()
        .with_context(|| "retrieval.mode must be tfidf, bm25, or hybrid")?;

    let c = &config.concepts;
    if c.pool_size < 1 {
        anyhow::bail!("concepts.pool_size must be >= 1");
    }
    if !(0.0..=1.0).contains(&c.min_score) {
        anyhow::bail!("concepts.min_score must be in [0.0, 1.0]");
    }
    if c.max_claims < 1 {
        anyhow::bail!("concepts.max_claims must be >= 1");
    }
    c.title_match
        .parse::<TitleMatch>()
        .map_err(|e| anyhow::anyhow!("concepts.title_match: {}", e))?;

    if config.cache.enabled && config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be > 0 when the cache is enabled");
    }
    Ok(())
}
