//! Core data types shared by the index, ranker, router, and compiler.
//!
//! A [`Section`] is the immutable unit of retrievable text: one numbered
//! section of one RFC. Sections are produced by the external acquisition
//! pipeline and never mutated after ingestion.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw section record as delivered by the acquisition pipeline.
///
/// One JSON object per line in the corpus files. Extra fields (for example
/// a precomputed `id` or `excerpt`) are ignored.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SectionRecord {
    pub rfc_number: u32,
    pub section: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
}

/// An addressable, content-hashed section of a standards document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    /// RFC number of the source document.
    pub rfc_number: u32,
    /// Section identifier, possibly hierarchical (`"1.1"`, `"3.2.4"`).
    pub section: String,
    /// Section heading.
    pub title: String,
    /// Full section text.
    pub text: String,
    /// Byte length of `text`.
    pub length: usize,
    /// SHA-256 hex digest of `title + "\n" + text`.
    pub sha256: String,
}

impl Section {
    /// Build a section from a raw record, computing its length and hash.
    ///
    /// # Example
    ///
    /// ```rust
    /// use netref_core::models::{Section, SectionRecord};
    ///
    /// let s = Section::from_record(SectionRecord {
    ///     rfc_number: 826,
    ///     section: "1".into(),
    ///     title: "Introduction".into(),
    ///     text: "ARP maps protocol addresses.".into(),
    /// });
    /// assert_eq!(s.length, 28);
    /// assert_eq!(s.sha256.len(), 64);
    /// ```
    pub fn from_record(rec: SectionRecord) -> Self {
        let sha256 = section_hash(&rec.title, &rec.text);
        Self {
            length: rec.text.len(),
            rfc_number: rec.rfc_number,
            section: rec.section,
            title: rec.title,
            text: rec.text,
            sha256,
        }
    }

    /// Lightweight reference to this section.
    pub fn to_ref(&self) -> SectionRef {
        SectionRef {
            rfc_number: self.rfc_number,
            section: self.section.clone(),
            title: self.title.clone(),
        }
    }

    pub fn url(&self) -> String {
        rfc_url(self.rfc_number)
    }
}

/// Identity of a section plus its title, carried on ranked hits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionRef {
    pub rfc_number: u32,
    pub section: String,
    pub title: String,
}

impl SectionRef {
    /// Deterministic order: RFC number ascending, then section id ascending.
    pub fn cmp_identity(&self, other: &Self) -> Ordering {
        self.rfc_number
            .cmp(&other.rfc_number)
            .then_with(|| compare_section_ids(&self.section, &other.section))
    }
}

/// Compare hierarchical section ids so that `"1.2"` sorts before `"1.10"`.
///
/// Parts are compared left to right. Numeric parts sort before non-numeric
/// ones; two numeric parts compare by value, then by text so `"01"` and `"1"`
/// stay distinct. Non-numeric parts compare lexically.
pub fn compare_section_ids(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = section_part_key(x).cmp(&section_part_key(y));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn section_part_key(part: &str) -> (bool, u64, &str) {
    match part.parse::<u64>() {
        Ok(n) => (false, n, part),
        Err(_) => (true, 0, part),
    }
}

/// Canonical text URL for an RFC.
pub fn rfc_url(rfc_number: u32) -> String {
    format!("https://www.rfc-editor.org/rfc/rfc{}.txt", rfc_number)
}

/// Content hash of a section: SHA-256 over `title + "\n" + text`.
pub fn section_hash(title: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Manifest describing one corpus snapshot's index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub index_hash: String,
    pub section_count: usize,
    pub corpus_hash: String,
    pub built_at: String,
}
