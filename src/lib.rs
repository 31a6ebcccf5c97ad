//! # netref
//!
//! Local retrieval and concept compilation over a corpus of RFC sections.
//!
//! netref loads a JSONL snapshot of RFC sections into an in-memory index,
//! ranks sections with TF-IDF, BM25 and a weighted hybrid, routes free-text
//! questions to an intent and target, and compiles evidence-backed concept
//! cards that are persisted in SQLite next to a content-hash manifest.
//!
//! The pure algorithms live in `netref-core`; this crate adds configuration,
//! persistence, caching, bulk compilation and the `netref` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Corpus    │──▶│    Index     │──▶│ Rank / Route │
//! │  (JSONL)    │   │ tf, df, hash │   │   Compile    │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │  SQLite  │
//!                   │ (netref) │       │  cards   │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! netref init
//! netref index build
//! netref ask "what is ARP"
//! netref concept compile arp --save
//! netref concept compile-many arp ospf bgp --save --progress human
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | JSONL corpus loading and the corpus hash |
//! | [`engine`] | The library entry point |
//! | [`cache`] | TTL + LRU response cache |
//! | [`sqlite_store`] | SQLite card store and index manifest |
//! | [`progress`] | Bulk compile progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`search`], [`concept_cmd`], [`index_cmd`], [`stats`] | CLI commands |

pub mod cache;
pub mod concept_cmd;
pub mod config;
pub mod corpus;
pub mod db;
pub mod engine;
pub mod index_cmd;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
