//! Typed error taxonomy for the core pipeline.
//!
//! Structural errors ([`IndexLoadError`], [`InvalidModeError`]) are hard
//! failures the caller must fix. Evidence-quality errors are carried by
//! [`CompileError`] and are expected outcomes of a compile, not bugs.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure while loading or building an [`Index`](crate::index::Index).
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("failed to read corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("duplicate section RFC {rfc_number} section {section}")]
    DuplicateSection { rfc_number: u32, section: String },

    #[error("invalid section record: {0}")]
    InvalidSection(String),

    #[error("dense vector dimension mismatch: expected {expected}, found {found}")]
    VectorDims { expected: usize, found: usize },
}

/// A ranking mode string that is not one of `tfidf`, `bm25`, `hybrid`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown ranking mode: {0}. Use tfidf, bm25, or hybrid.")]
pub struct InvalidModeError(pub String);

/// Machine-readable compile failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LowConfidence,
    NoMatch,
    BadCard,
    MissingCitation,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LowConfidence => "LOW_CONFIDENCE",
            ErrorCode::NoMatch => "NO_MATCH",
            ErrorCode::BadCard => "BAD_CARD",
            ErrorCode::MissingCitation => "MISSING_CITATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed outcome of a failed concept compile.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct CompileError {
    pub code: ErrorCode,
    pub message: String,
}

impl CompileError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn low_confidence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LowConfidence, message)
    }

    pub fn no_match(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoMatch, message)
    }

    pub fn bad_card(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadCard, message)
    }

    pub fn missing_citation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingCitation, message)
    }
}

/// Lookup of a concept card that is not in the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("concept card not found: {0}")]
pub struct NotFoundError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_screaming_snake() {
        assert_eq!(ErrorCode::LowConfidence.as_str(), "LOW_CONFIDENCE");
        assert_eq!(ErrorCode::MissingCitation.to_string(), "MISSING_CITATION");
        let json = serde_json::to_string(&ErrorCode::NoMatch).unwrap();
        assert_eq!(json, "\"NO_MATCH\"");
    }

    #[test]
    fn compile_error_display_includes_code() {
        let err = CompileError::bad_card("empty slug");
        assert_eq!(err.to_string(), "BAD_CARD: empty slug");
    }
}
