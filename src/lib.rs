//! # ragline
//!
//! A dataflow pipeline engine and vector-backed document store for
//! retrieval-augmented generation.
//!
//! ragline models a RAG system as a directed graph of named components
//! wired together through typed sockets, executes that graph in
//! dependency order per request, and persists fixed-dimension embeddings
//! in SQLite with deduplicating, transactional batch writes.
//!
//! ## Architecture
//!
//! ```text
//! indexing:  ┌──────────┐   ┌────────┐
//!            │ embedder  │──▶│ writer │──▶ SQLite (documents)
//!            └──────────┘   └────────┘          │
//!                                               │
//! query:  ┌───────────────┐   ┌───────────┐     │
//!         │ query_embedder │──▶│ retriever │◀────┘
//!         └───────────────┘   └─────┬─────┘
//!                                   ▼
//!                          ┌────────────────┐   ┌───────────┐
//!                          │ prompt_builder │──▶│ generator │──▶ reply
//!                          └────────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pipeline`] | Typed-socket DAG engine |
//! | [`store`] | SQLite vector document store |
//! | [`embedding`] | Embedding service client |
//! | [`embedder`] | Document/text embedding components |
//! | [`retriever`] | Nearest-neighbor retrieval component |
//! | [`prompt`] | Prompt template rendering |
//! | [`generator`] | Completion service client and component |
//! | [`writer`] | Store-writing component |
//! | [`loader`] | PDF loading and document splitting |
//! | [`rag`] | Pipeline assembly and workflows |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |

pub mod config;
pub mod document;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod rag;
pub mod retriever;
pub mod store;
pub mod writer;

pub use document::Document;
pub use error::{Error, Result};
pub use pipeline::{Component, Pipeline, Value, ValueKind};
pub use store::{DedupPolicy, DistanceMetric, VectorStore};
