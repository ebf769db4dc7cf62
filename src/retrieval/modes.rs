//! Retrieval mode table.

use serde::Serialize;

use crate::error::AppError;
use crate::models::{CHUNK_LABEL, COMMUNITY_LABEL, EMBEDDING_PROPERTY, ENTITY_LABEL};

/// Mode used when a caller does not name one.
pub const DEFAULT_MODE: &str = "graph_vector_fulltext";

/// How the hits of a mode are turned into context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Chunk texts grouped by document.
    Chunks,
    /// Chunk texts plus the entity neighborhood of each document group.
    ChunkGraph,
    /// Entity hits with their chunks, communities, and neighbors.
    LocalCommunity,
    /// Community summaries.
    GlobalCommunity,
    /// Entity hits expanded into their neighborhood.
    EntityGraph,
}

/// Configuration of one retrieval mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeConfig {
    pub id: &'static str,
    pub strategy: RetrievalStrategy,
    /// Hits requested from each index.
    pub top_k: usize,
    pub vector_index: &'static str,
    pub keyword_index: Option<&'static str>,
    /// Whether a caller-supplied document list restricts the search.
    pub document_filter: bool,
    /// Anchor label searched by the mode.
    pub node_label: &'static str,
    pub embedding_field: &'static str,
    pub text_fields: &'static [&'static str],
    /// Groups kept after ranking.
    pub group_limit: usize,
    /// Items kept per group.
    pub per_group_limit: usize,
}

/// Immutable lookup from mode id to [`ModeConfig`].
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    modes: Vec<ModeConfig>,
}

impl ModeRegistry {
    /// The seven standard modes.
    pub fn standard() -> Self {
        let chunk = |id: &'static str,
                     strategy: RetrievalStrategy,
                     keyword_index: Option<&'static str>,
                     document_filter: bool,
                     per_group_limit: usize| ModeConfig {
            id,
            strategy,
            top_k: 50,
            vector_index: "vector",
            keyword_index,
            document_filter,
            node_label: CHUNK_LABEL,
            embedding_field: EMBEDDING_PROPERTY,
            text_fields: &["text"],
            group_limit: 10,
            per_group_limit,
        };

        Self {
            modes: vec![
                chunk("vector", RetrievalStrategy::Chunks, None, true, 3),
                chunk("fulltext", RetrievalStrategy::Chunks, Some("keyword"), false, 3),
                ModeConfig {
                    id: "entity_vector",
                    strategy: RetrievalStrategy::LocalCommunity,
                    top_k: 30,
                    vector_index: "entity_vector",
                    keyword_index: None,
                    document_filter: false,
                    node_label: ENTITY_LABEL,
                    embedding_field: EMBEDDING_PROPERTY,
                    text_fields: &["id"],
                    group_limit: 30,
                    per_group_limit: 1,
                },
                chunk("graph_vector", RetrievalStrategy::ChunkGraph, None, true, 2),
                chunk(
                    "graph_vector_fulltext",
                    RetrievalStrategy::ChunkGraph,
                    Some("keyword"),
                    false,
                    2,
                ),
                ModeConfig {
                    id: "global_vector",
                    strategy: RetrievalStrategy::GlobalCommunity,
                    top_k: 20,
                    vector_index: "community_vector",
                    keyword_index: Some("community_keyword"),
                    document_filter: false,
                    node_label: COMMUNITY_LABEL,
                    embedding_field: EMBEDDING_PROPERTY,
                    text_fields: &["summary"],
                    group_limit: 20,
                    per_group_limit: 1,
                },
                ModeConfig {
                    id: "graph",
                    strategy: RetrievalStrategy::EntityGraph,
                    top_k: 30,
                    vector_index: "entity_vector",
                    keyword_index: Some("entities"),
                    document_filter: false,
                    node_label: ENTITY_LABEL,
                    embedding_field: EMBEDDING_PROPERTY,
                    text_fields: &["id", "description"],
                    group_limit: 30,
                    per_group_limit: 1,
                },
            ],
        }
    }

    /// Resolves a mode id. Unknown ids are a caller error.
    pub fn lookup(&self, id: &str) -> Result<&ModeConfig, AppError> {
        self.modes
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::UnknownMode(id.to_string()))
    }

    /// All modes in registration order.
    pub fn modes(&self) -> &[ModeConfig] {
        &self.modes
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
