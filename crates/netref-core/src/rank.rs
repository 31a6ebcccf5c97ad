//! Hybrid lexical ranker.
//!
//! Scores index sections against query terms with two independent
//! statistical models and a weighted blend:
//!
//! | Model | Score |
//! |-------|-------|
//! | TF-IDF | cosine of `qtf·idf` and `tf·idf` vectors, `idf = ln((N+1)/(df+1)) + 1` |
//! | BM25 | `Σ idf · tf(k1+1) / (tf + k1(1 − b + b·len/avglen))` |
//! | Hybrid | `w_tfidf · minmax(tfidf) + w_bm25 · minmax(bm25)` |
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Restrict candidates to the requested [`Scope`] (IDF always comes from
//!    the full corpus).
//! 2. Compute raw TF-IDF and BM25 scores for every candidate.
//! 3. Min-max normalize each model independently across the candidate set.
//! 4. Blend with the configured weights. When dense scoring is enabled and
//!    a query vector is supplied, add `w_dense · minmax(dense)`.
//! 5. Sort by the active mode's score (desc), then RFC number (asc), then
//!    section id (asc).
//!
//! Identical inputs always produce bit-identical output: candidate order,
//! summation order, and the tie-break are all fixed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dense::cosine_similarity;
use crate::error::InvalidModeError;
use crate::index::{smooth_idf, Index};
use crate::models::SectionRef;
use crate::tokenize::tokenize;

/// Which score is used as the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    Tfidf,
    Bm25,
    #[default]
    Hybrid,
}

impl RankMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankMode::Tfidf => "tfidf",
            RankMode::Bm25 => "bm25",
            RankMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for RankMode {
    type Err = InvalidModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tfidf" => Ok(RankMode::Tfidf),
            "bm25" => Ok(RankMode::Bm25),
            "hybrid" => Ok(RankMode::Hybrid),
            _ => Err(InvalidModeError(s.to_string())),
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RankParams {
    /// BM25 term-frequency saturation.
    pub k1: f64,
    /// BM25 length normalization.
    pub b: f64,
    /// Weight of normalized TF-IDF in the hybrid blend.
    pub w_tfidf: f64,
    /// Weight of normalized BM25 in the hybrid blend.
    pub w_bm25: f64,
    /// Include the dense score in the hybrid blend.
    pub use_dense: bool,
    /// Weight of normalized dense similarity when `use_dense` is set.
    pub w_dense: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            w_tfidf: 0.6,
            w_bm25: 0.4,
            use_dense: false,
            w_dense: 0.0,
        }
    }
}

/// Candidate sections to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "rfc_number")]
pub enum Scope {
    /// Every section in the index.
    All,
    /// Only sections of one RFC.
    Document(u32),
}

/// One ranked section with its per-model scores.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredHit {
    pub section: SectionRef,
    /// Position of the section in the index.
    #[serde(skip)]
    pub position: usize,
    /// Raw TF-IDF cosine in `[0, 1]`.
    pub tfidf: f64,
    /// Raw BM25 score.
    pub bm25: f64,
    /// Weighted blend of the normalized component scores.
    pub hybrid: f64,
    /// Cosine similarity to the query vector, when both vectors exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense: Option<f64>,
}

impl ScoredHit {
    /// The sort key for `mode`.
    pub fn score(&self, mode: RankMode) -> f64 {
        match mode {
            RankMode::Tfidf => self.tfidf,
            RankMode::Bm25 => self.bm25,
            RankMode::Hybrid => self.hybrid,
        }
    }

    /// True if the section shares at least one term with the query.
    pub fn matched(&self) -> bool {
        self.tfidf > 0.0 || self.bm25 > 0.0
    }
}

/// Tokenize `query` and score it. See [`score`].
pub fn score_query(
    index: &Index,
    query: &str,
    mode: RankMode,
    scope: Scope,
    params: &RankParams,
    query_vec: Option<&[f32]>,
) -> Vec<ScoredHit> {
    score(index, &tokenize(query), mode, scope, params, query_vec)
}

/// Score every candidate section in `scope` against `terms`.
///
/// Returns an empty vector when `terms` is empty or the scope has no
/// sections. Sections with no overlapping terms are still returned (with
/// zero lexical scores) so that normalization sees the whole candidate set;
/// use [`ScoredHit::matched`] to filter them for display.
pub fn score(
    index: &Index,
    terms: &[String],
    mode: RankMode,
    scope: Scope,
    params: &RankParams,
    query_vec: Option<&[f32]>,
) -> Vec<ScoredHit> {
    if terms.is_empty() {
        return Vec::new();
    }

    let candidates: Vec<usize> = match scope {
        Scope::All => (0..index.section_count()).collect(),
        Scope::Document(n) => index.document_positions(n),
    };
    if candidates.is_empty() {
        return Vec::new();
    }

    let n = index.section_count();
    let query_tf = term_counts(terms);

    let q_terms: Vec<QueryTerm<'_>> = query_tf
        .iter()
        .map(|(t, qtf)| {
            let df = index.df(t);
            let idf = smooth_idf(n, df);
            QueryTerm {
                term: t.as_str(),
                weight: *qtf as f64 * idf,
                idf,
                idf_bm25: bm25_idf(n, df),
            }
        })
        .collect();
    let q_norm = q_terms.iter().map(|q| q.weight * q.weight).sum::<f64>().sqrt();

    let avg_len = if index.avg_len() > 0.0 {
        index.avg_len()
    } else {
        1.0
    };

    let mut hits: Vec<ScoredHit> = Vec::with_capacity(candidates.len());
    for &pos in &candidates {
        let (Some(section), Some(stats)) = (index.section(pos), index.stats(pos)) else {
            continue;
        };

        let mut dot = 0.0;
        let mut bm25 = 0.0;
        for q in &q_terms {
            let tf = match stats.tf.get(q.term) {
                Some(&tf) if tf > 0 => tf as f64,
                _ => continue,
            };
            dot += q.weight * tf * q.idf;

            let len_norm = 1.0 - params.b + params.b * stats.len as f64 / avg_len;
            bm25 += q.idf_bm25 * (tf * (params.k1 + 1.0)) / (tf + params.k1 * len_norm);
        }

        let tfidf = if q_norm > 0.0 && stats.tfidf_norm > 0.0 {
            dot / (q_norm * stats.tfidf_norm)
        } else {
            0.0
        };

        let dense = match (query_vec, index.dense_vector(pos)) {
            (Some(q), Some(v)) => Some(cosine_similarity(q, v)),
            _ => None,
        };

        hits.push(ScoredHit {
            section: section.to_ref(),
            position: pos,
            tfidf,
            bm25,
            hybrid: 0.0,
            dense,
        });
    }

    let tfidf_norm = normalize_scores(&hits.iter().map(|h| h.tfidf).collect::<Vec<_>>());
    let bm25_norm = normalize_scores(&hits.iter().map(|h| h.bm25).collect::<Vec<_>>());
    let dense_norm = if params.use_dense && hits.iter().any(|h| h.dense.is_some()) {
        let raw: Vec<f64> = hits.iter().map(|h| h.dense.unwrap_or(0.0)).collect();
        Some(normalize_scores(&raw))
    } else {
        None
    };

    for (i, hit) in hits.iter_mut().enumerate() {
        let dense_component = dense_norm
            .as_ref()
            .filter(|_| hit.dense.is_some())
            .map(|d| d[i]);
        hit.hybrid = blend(tfidf_norm[i], bm25_norm[i], dense_component, params);
    }

    sort_hits(&mut hits, mode);
    hits
}

/// Weighted hybrid blend of already-normalized component scores.
///
/// ```rust
/// use netref_core::rank::{blend, RankParams};
///
/// let params = RankParams::default();
/// assert!((blend(1.0, 1.0, None, &params) - 1.0).abs() < 1e-12);
/// assert!((blend(0.0, 1.0, None, &params) - 0.4).abs() < 1e-12);
/// ```
pub fn blend(tfidf_norm: f64, bm25_norm: f64, dense_norm: Option<f64>, params: &RankParams) -> f64 {
    let mut score = params.w_tfidf * tfidf_norm + params.w_bm25 * bm25_norm;
    if params.use_dense {
        if let Some(d) = dense_norm {
            score += params.w_dense * d;
        }
    }
    score
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal they normalize to `1.0` when positive and `0.0`
/// otherwise, so a candidate set with no overlap at all never looks like a
/// perfect match.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }

    let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    raw.iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                if s_max > 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Per-query-term weights, computed once per query.
struct QueryTerm<'q> {
    term: &'q str,
    /// Query tf times smoothed idf.
    weight: f64,
    idf: f64,
    idf_bm25: f64,
}

/// Sort hits by the mode's score (desc) with the identity tie-break.
pub fn sort_hits(hits: &mut [ScoredHit], mode: RankMode) {
    hits.sort_by(|a, b| {
        b.score(mode)
            .total_cmp(&a.score(mode))
            .then_with(|| a.section.cmp_identity(&b.section))
    });
}

/// BM25 inverse document frequency, floored at zero by the `+ 1` term.
fn bm25_idf(n: usize, df: u32) -> f64 {
    let n = n as f64;
    let df = df as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Count terms, keeping first-occurrence order.
fn term_counts(terms: &[String]) -> Vec<(String, u32)> {
    let mut order: Vec<(String, u32)> = Vec::new();
    let mut idx: HashMap<&str, usize> = HashMap::new();
    for t in terms {
        match idx.get(t.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                idx.insert(t.as_str(), order.len());
                order.push((t.clone(), 1));
            }
        }
    }
    order
}

/// Total ordering helper for ad-hoc score comparisons elsewhere in the crate.
pub(crate) fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
