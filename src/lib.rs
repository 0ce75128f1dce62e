//! # Corpus Graph
//!
//! Hybrid keyword + graph search over a YAML knowledge corpus.
//!
//! A corpus is a directory of semi-structured YAML node files (decisions,
//! learnings, patterns, concepts). Corpus Graph derives two artifacts from
//! it — a TF-IDF inverted text index and a typed knowledge graph with a
//! precomputed adjacency index — and answers search queries by merging
//! keyword relevance with graph proximity, then re-ranking with an
//! externally computed freshness (decay) score.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────────────┐
//! │ YAML corpus  │──▶│ Graph Builder │──▶│ graph.json          │
//! │ nodes/*.yml  │   │ scan + infer  │   │ adjacency.json      │
//! └──────┬───────┘   └───────────────┘   └──────────┬──────────┘
//!        │                                          │
//!        ▼                                          ▼
//! ┌──────────────┐                       ┌─────────────────────┐
//! │  Text Index  │──────────────────────▶│   Hybrid Searcher   │
//! │  index.yml   │      merge + boost    │ (+ decay_index.json)│
//! └──────────────┘                       └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kg build --infer              # derive the graph from the corpus
//! kg search "database migration" --mode hybrid
//! kg graph neighbors DEC-001 --hops 2
//! kg graph validate             # consistency check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types (nodes, edges, relations, results) |
//! | [`document`] | Corpus YAML document parsing |
//! | [`text_index`] | TF-IDF inverted index |
//! | [`graph`] | Graph store: CRUD, traversal, validation |
//! | [`builder`] | Graph construction from corpus documents |
//! | [`decay`] | Read-only freshness index |
//! | [`search`] | Hybrid merge, filters, decay boost |
//! | [`graph_cmd`] | `kg graph` CLI handlers |

pub mod builder;
pub mod config;
pub mod decay;
pub mod document;
pub mod graph;
pub mod graph_cmd;
pub mod models;
pub mod search;
pub mod text_index;

pub use config::Config;
pub use graph::{Direction, GraphStore};
pub use models::{GraphEdge, GraphNode, NodeKind, Relation, SearchResult};
pub use search::{HybridSearcher, SearchFilters, SearchMode};
pub use text_index::TextIndex;
