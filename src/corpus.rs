//! Corpus loading: JSONL section records into an [`Index`].
//!
//! The corpus path is either a single JSONL file or a directory walked
//! recursively for `*.jsonl` files. Files are read in sorted path order so
//! that the resulting index and corpus hash do not depend on directory
//! iteration order. Blank lines are skipped; a malformed line fails the
//! whole load with its file and line number.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use netref_core::error::IndexLoadError;
use netref_core::index::{DenseVector, Index};
use netref_core::models::SectionRecord;

use crate::config::CorpusConfig;

/// Records read from disk plus a hash of the raw corpus bytes.
#[derive(Debug)]
pub struct Corpus {
    pub records: Vec<SectionRecord>,
    pub files: Vec<PathBuf>,
    /// SHA-256 over the raw bytes of every corpus file, in load order.
    pub corpus_hash: String,
}

/// List the JSONL files under `path` in sorted order.
pub fn corpus_files(path: &Path) -> Result<Vec<PathBuf>, IndexLoadError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(IndexLoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "corpus path not found"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| IndexLoadError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("jsonl")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn read_jsonl<T: DeserializeOwned>(
    path: &Path,
    hasher: Option<&mut Sha256>,
) -> Result<Vec<T>, IndexLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| IndexLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(h) = hasher {
        h.update(content.as_bytes());
    }

    let mut out = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(line).map_err(|e| IndexLoadError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            message: e.to_string(),
        })?;
        out.push(item);
    }
    Ok(out)
}

/// Read every section record under `path`.
pub fn load_corpus(path: &Path) -> Result<Corpus, IndexLoadError> {
    let files = corpus_files(path)?;
    let mut hasher = Sha256::new();
    let mut records = Vec::new();
    for file in &files {
        records.extend(read_jsonl::<SectionRecord>(file, Some(&mut hasher))?);
    }
    Ok(Corpus {
        records,
        files,
        corpus_hash: hex::encode(hasher.finalize()),
    })
}

/// Read the optional dense-vector artifact.
pub fn load_vectors(path: &Path) -> Result<Vec<DenseVector>, IndexLoadError> {
    read_jsonl(path, None)
}

/// Load the configured corpus and build the index. Returns the index and
/// the corpus hash.
pub fn build_index(config: &CorpusConfig) -> Result<(Index, String), IndexLoadError> {
    let corpus = load_corpus(&config.path)?;
    let mut index = Index::build(corpus.records)?;
    match &config.vectors {
        Some(vectors) if vectors.exists() => {
            index = index.with_dense_vectors(load_vectors(vectors)?)?;
        }
        Some(vectors) => {
            tracing::warn!(
                path = %vectors.display(),
                "dense vector file not found, ranking is lexical only"
            );
        }
        None => {}
    }
    tracing::info!(
        sections = index.section_count(),
        files = corpus.files.len(),
        index_hash = %index.hash(),
        "index built"
    );
    Ok((index, corpus.corpus_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const A: &str = r#"{"rfc_number": 826, "section": "1", "title": "Introduction", "text": "ARP maps addresses."}"#;
    const B: &str = r#"{"rfc_number": 2328, "section": "1", "title": "Introduction", "text": "OSPF is link-state."}"#;

    #[test]
    fn directory_load_is_order_independent() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("b.jsonl"), format!("{}\n", B)).unwrap();
        fs::write(tmp.path().join("sub/a.jsonl"), format!("\n{}\n", A)).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let corpus = load_corpus(tmp.path()).unwrap();
        assert_eq!(corpus.files.len(), 2);
        assert_eq!(corpus.records.len(), 2);
        assert_eq!(corpus.records[0].rfc_number, 2328);

        let again = load_corpus(tmp.path()).unwrap();
        assert_eq!(corpus.corpus_hash, again.corpus_hash);
    }

    #[test]
    fn malformed_line_reports_location() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.jsonl");
        fs::write(&path, format!("{}\n{{not json\n", A)).unwrap();
        match load_corpus(&path) {
            Err(IndexLoadError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn missing_path_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_corpus(&tmp.path().join("nope")),
            Err(IndexLoadError::Io { .. })
        ));
    }

    #[test]
    fn build_index_attaches_vectors() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("sections.jsonl");
        let vectors = tmp.path().join("vectors.jsonl");
        fs::write(&corpus, format!("{}\n{}\n", A, B)).unwrap();
        fs::write(
            &vectors,
            r#"{"rfc_number": 826, "section": "1", "vector": [1.0, 0.0]}"#,
        )
        .unwrap();
        let (index, hash) = build_index(&CorpusConfig {
            path: corpus,
            vectors: Some(vectors),
        })
        .unwrap();
        assert_eq!(index.section_count(), 2);
        assert!(index.has_dense());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn missing_vectors_file_falls_back_to_lexical() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("sections.jsonl");
        fs::write(&corpus, format!("{}\n{}\n", A, B)).unwrap();
        let (index, _) = build_index(&CorpusConfig {
            path: corpus,
            vectors: Some(tmp.path().join("vectors.jsonl")),
        })
        .unwrap();
        assert_eq!(index.section_count(), 2);
        assert!(!index.has_dense());
    }

    #[test]
    fn malformed_vectors_file_still_fails() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("sections.jsonl");
        let vectors = tmp.path().join("vectors.jsonl");
        fs::write(&corpus, format!("{}\n", A)).unwrap();
        fs::write(&vectors, "not json\n").unwrap();
        assert!(build_index(&CorpusConfig {
            path: corpus,
            vectors: Some(vectors),
        })
        .is_err());
    }
}
