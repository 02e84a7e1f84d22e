//! # repo-rag
//!
//! Retrieval-augmented question answering over a GitHub repository.
//!
//! A repository is loaded file by file, filtered down to source and
//! documentation, and each kept file is summarized and embedded by a remote
//! model. Questions are answered by embedding the question, ranking the
//! stored files by cosine similarity inside SQLite, and handing the top
//! matches to the model as context. Recent commits get their own summaries,
//! with a keyword-based fallback when the model is unavailable.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Loader   │──▶│  Filter  │──▶│ Indexer          │──▶│  SQLite  │
//! │ API / git │   │          │   │ summarize+embed  │   │ + cosine │
//! └───────────┘   └──────────┘   └──────────────────┘   └────┬─────┘
//!                                                             │
//!                                   ┌─────────────────────────┤
//!                                   ▼                         ▼
//!                              ┌──────────┐             ┌──────────┐
//!                              │  Query   │             │ Commits  │
//!                              │ top-K+LM │             │ poller   │
//!                              └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! repo-rag init
//! repo-rag project add widgets acme/widgets
//! repo-rag index widgets
//! repo-rag ask widgets "How are requests retried?"
//! repo-rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`loader`] | GitHub API and git clone loaders |
//! | [`filter`] | Relevance filter |
//! | [`adapter`] | Model adapters and summary fallback |
//! | [`prompt`] | Prompt templates |
//! | [`index`] | Two-phase indexing pipeline |
//! | [`query`] | Question answering |
//! | [`commits`] | Commit polling and summaries |
//! | [`projects`] | Project registry |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`settle`] | Bounded concurrency and per-call timeouts |
//! | [`server`] | JSON HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapter;
pub mod commands;
pub mod commits;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod index;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod projects;
pub mod prompt;
pub mod query;
pub mod server;
pub mod settle;
pub mod store;
