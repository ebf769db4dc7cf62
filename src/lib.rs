//! kgrag - graph-augmented retrieval and context assembly
//!
//! Locates the relevant region of a document/chunk/entity/community knowledge
//! graph for a query, ranks and deduplicates it, and renders a bounded
//! context with provenance. Also exports deduplicated subgraphs for
//! visualization.

pub mod cli;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod graph;
pub mod models;
pub mod retrieval;
pub mod services;
pub mod store;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
