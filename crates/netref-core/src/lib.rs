//! # netref core
//!
//! Pure retrieval and compilation logic for netref: the section index,
//! tokenizer, hybrid ranker, query router, definition assembler, concept
//! card compiler, and the card store abstraction.
//!
//! This crate performs no filesystem or database I/O. Corpus loading,
//! SQLite persistence, caching and the CLI live in the `netref` crate.

pub mod card;
pub mod catalog;
pub mod compile;
pub mod define;
pub mod dense;
pub mod diff;
pub mod error;
pub mod index;
pub mod lexicon;
pub mod links;
pub mod models;
pub mod rank;
pub mod router;
pub mod store;
pub mod tokenize;
