//! # RFP Harness
//!
//! Retrieval-augmented authoring for government procurement documents.
//!
//! RFP Harness ingests a corpus of past solicitations (PDF or text), infers
//! industry and project metadata for each, stores them in a vector store,
//! and serves filtered semantic search. Generation requests are answered by
//! pulling the most relevant references, composing a structured prompt,
//! and handing it to a text-generation backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Source dir │──▶│  Ingestion  │──▶│ Vector store │
//! │ PDF + JSON │   │ Meta+Extract│   │ memory/Weav. │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │
//!                   ┌───────────────────────┤
//!                   ▼                       ▼
//!             ┌──────────┐           ┌────────────┐
//!             │  Search  │──────────▶│ Generation │
//!             │+fallback │           │ prompt+LLM │
//!             └──────────┘           └────────────┘
//! ```
//!
//! Reads never fail because the store is down: they return curated
//! fallback data tagged [`models::Provenance::Fallback`]. Writes report
//! [`error::StoreError::Unavailable`].
//!
//! ## Quick Start
//!
//! ```bash
//! rfp init                           # prepare the collection
//! rfp ingest all --dir ./data/rfps   # ingest a directory
//! rfp search "wastewater treatment" --industry Utilities
//! rfp generate --input request.json  # draft an RFP
//! rfp serve                          # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors at module seams |
//! | [`metadata`] | Industry/project metadata inference |
//! | [`extract`] | PDF and text extraction |
//! | [`embedding`] | Embedding providers for the memory store |
//! | [`store`] | Vector store adapter and backends |
//! | [`ingest`] | Ingestion pipeline |
//! | [`fallback`] | Curated degraded-mode data |
//! | [`search`] | Search, similarity, suggestions, stats |
//! | [`prompt`] | Prompt composition |
//! | [`llm`] | Text-generation backends |
//! | [`generate`] | Generation orchestrator |
//! | [`compliance`] | Section checklist validation |
//! | [`server`] | HTTP API |

pub mod compliance;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod generate;
pub mod ingest;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod prompt;
pub mod search;
pub mod server;
pub mod store;
