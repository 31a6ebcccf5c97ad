//! In-memory section index for one corpus snapshot.
//!
//! The [`Index`] owns every [`Section`] plus the statistics both ranking
//! models need: per-section term frequencies and lengths, the global
//! document-frequency table, average section length, and each section's
//! TF-IDF vector norm. It is built once and is read-only afterwards, so a
//! single `Arc<Index>` can be shared by any number of concurrent readers.
//!
//! # Index hash
//!
//! The index hash is SHA-256 over the *sorted* list of section hashes,
//! joined with `\n`. Sorting makes the hash independent of ingestion
//! order: two builds from the same sections always agree, which is what
//! card staleness is measured against.

use std::collections::{HashMap, HashSet};

use crate::error::IndexLoadError;
use crate::models::{sha256_hex, Section, SectionRecord};
use crate::tokenize::tokenize;

/// Term statistics for a single section.
#[derive(Debug, Clone)]
pub struct SectionStats {
    /// Raw term frequency per term (title and text combined).
    pub tf: HashMap<String, u32>,
    /// Number of tokens.
    pub len: usize,
    /// Euclidean norm of the section's `tf × idf` vector.
    pub tfidf_norm: f64,
}

/// Read-only index over all sections of one corpus snapshot.
#[derive(Debug, Clone)]
pub struct Index {
    sections: Vec<Section>,
    stats: Vec<SectionStats>,
    df: HashMap<String, u32>,
    avg_len: f64,
    dense: Option<Vec<Option<Vec<f32>>>>,
    positions: HashMap<(u32, String), usize>,
    hash: String,
}

/// Dense vector keyed by section identity, from the optional vectors artifact.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DenseVector {
    pub rfc_number: u32,
    pub section: String,
    pub vector: Vec<f32>,
}

impl Index {
    /// Build an index from raw section records in ingestion order.
    ///
    /// Fails on invalid records (RFC number 0, empty section id) and on
    /// duplicate `(rfc_number, section)` identities.
    pub fn build(records: Vec<SectionRecord>) -> Result<Self, IndexLoadError> {
        let mut sections = Vec::with_capacity(records.len());
        let mut positions = HashMap::with_capacity(records.len());

        for rec in records {
            if rec.rfc_number == 0 {
                return Err(IndexLoadError::InvalidSection(format!(
                    "section {:?} has rfc_number 0",
                    rec.section
                )));
            }
            if rec.section.trim().is_empty() {
                return Err(IndexLoadError::InvalidSection(format!(
                    "RFC {} has a section with an empty id",
                    rec.rfc_number
                )));
            }
            let key = (rec.rfc_number, rec.section.clone());
            if positions.contains_key(&key) {
                return Err(IndexLoadError::DuplicateSection {
                    rfc_number: rec.rfc_number,
                    section: rec.section,
                });
            }
            positions.insert(key, sections.len());
            sections.push(Section::from_record(rec));
        }

        let mut df: HashMap<String, u32> = HashMap::new();
        let mut stats = Vec::with_capacity(sections.len());
        for s in &sections {
            let mut tf: HashMap<String, u32> = HashMap::new();
            let tokens = tokenize(&format!("{}\n{}", s.title, s.text));
            let len = tokens.len();
            for t in tokens {
                *tf.entry(t).or_insert(0) += 1;
            }
            for t in tf.keys() {
                *df.entry(t.clone()).or_insert(0) += 1;
            }
            stats.push(SectionStats {
                tf,
                len,
                tfidf_norm: 0.0,
            });
        }

        let total_len: usize = stats.iter().map(|s| s.len).sum();
        let avg_len = if stats.is_empty() {
            0.0
        } else {
            total_len as f64 / stats.len() as f64
        };

        let n = sections.len();
        for st in &mut stats {
            // Sum in sorted term order so the norm is bit-identical across builds.
            let mut terms: Vec<(&String, &u32)> = st.tf.iter().collect();
            terms.sort_by(|a, b| a.0.cmp(b.0));
            let sq: f64 = terms
                .iter()
                .map(|(t, tf)| {
                    let w = **tf as f64 * smooth_idf(n, df.get(*t).copied().unwrap_or(0));
                    w * w
                })
                .sum();
            st.tfidf_norm = sq.sqrt();
        }

        let hash = compute_index_hash(sections.iter().map(|s| s.sha256.as_str()));

        Ok(Self {
            sections,
            stats,
            df,
            avg_len,
            dense: None,
            positions,
            hash,
        })
    }

    /// Attach precomputed dense vectors.
    ///
    /// Vectors for unknown sections are ignored. All vectors must share one
    /// dimensionality. Sections without a vector simply carry no dense score.
    pub fn with_dense_vectors(mut self, vectors: Vec<DenseVector>) -> Result<Self, IndexLoadError> {
        let mut dims: Option<usize> = None;
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; self.sections.len()];
        for v in vectors {
            if let Some(d) = dims {
                if d != v.vector.len() {
                    return Err(IndexLoadError::VectorDims {
                        expected: d,
                        found: v.vector.len(),
                    });
                }
            } else {
                dims = Some(v.vector.len());
            }
            if let Some(&pos) = self.positions.get(&(v.rfc_number, v.section)) {
                slots[pos] = Some(v.vector);
            }
        }
        self.dense = Some(slots);
        Ok(self)
    }

    /// Version identity of this corpus snapshot.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, pos: usize) -> Option<&Section> {
        self.sections.get(pos)
    }

    pub fn stats(&self, pos: usize) -> Option<&SectionStats> {
        self.stats.get(pos)
    }

    /// Look up a section by identity.
    pub fn find(&self, rfc_number: u32, section: &str) -> Option<&Section> {
        self.positions
            .get(&(rfc_number, section.to_string()))
            .and_then(|&p| self.sections.get(p))
    }

    /// Positions of all sections belonging to one RFC, in ingestion order.
    pub fn document_positions(&self, rfc_number: u32) -> Vec<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.rfc_number == rfc_number)
            .map(|(i, _)| i)
            .collect()
    }

    /// Distinct RFC numbers present in the corpus, ascending.
    pub fn documents(&self) -> Vec<u32> {
        let set: HashSet<u32> = self.sections.iter().map(|s| s.rfc_number).collect();
        let mut docs: Vec<u32> = set.into_iter().collect();
        docs.sort_unstable();
        docs
    }

    pub fn contains_document(&self, rfc_number: u32) -> bool {
        self.sections.iter().any(|s| s.rfc_number == rfc_number)
    }

    /// Number of sections containing `term`.
    pub fn df(&self, term: &str) -> u32 {
        self.df.get(term).copied().unwrap_or(0)
    }

    pub fn avg_len(&self) -> f64 {
        self.avg_len
    }

    /// Number of distinct terms across the corpus.
    pub fn vocabulary_size(&self) -> usize {
        self.df.len()
    }

    /// Dense vector for a section, if the vectors artifact provided one.
    pub fn dense_vector(&self, pos: usize) -> Option<&[f32]> {
        self.dense
            .as_ref()
            .and_then(|d| d.get(pos))
            .and_then(|v| v.as_deref())
    }

    pub fn has_dense(&self) -> bool {
        self.dense
            .as_ref()
            .map(|d| d.iter().any(Option::is_some))
            .unwrap_or(false)
    }
}

/// Smoothed TF-IDF inverse document frequency: `ln((N+1)/(df+1)) + 1`.
pub fn smooth_idf(n: usize, df: u32) -> f64 {
    ((n as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
}

/// Hash over the sorted sequence of section hashes.
pub fn compute_index_hash<'a>(hashes: impl Iterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = hashes.collect();
    sorted.sort_unstable();
    sha256_hex(sorted.join("\n").as_bytes())
}
