//! Read access to the knowledge graph.
//!
//! [`GraphStore`] is the seam between the retrieval pipeline and the
//! database. Each method answers one small, single-purpose question with
//! typed records; all branching, ranking, and deduplication happens in the
//! callers. Two implementations exist:
//!
//! - [`CypherStore`] - parameterized Cypher over any [`CypherExecutor`](crate::graph::CypherExecutor)
//! - [`MemoryStore`] - an in-process graph loaded from a JSON fixture
//!
//! Returned nodes never carry their `embedding` property. Where a caller
//! needs a vector it is returned next to the node ([`EntityMention::embedding`]).

mod cypher;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    ChunkText, GraphCounts, GraphNode, GraphPath, GraphRelationship, RelationshipRecord,
};

pub use cypher::CypherStore;
pub use memory::{MemoryGraph, MemoryStore};

/// Shared handle to the configured store.
pub type AppStore = Arc<dyn GraphStore>;

/// Similarity search against a vector index.
#[derive(Debug, Clone)]
pub struct VectorSearch<'a> {
    pub index: &'a str,
    /// Anchor label, used by the exact (document filtered) path.
    pub label: &'a str,
    pub embedding_field: &'a str,
    pub embedding: &'a [f32],
    pub top_k: usize,
    /// When non-empty, only chunks of these documents are scored.
    pub document_names: &'a [String],
}

/// Search against a fulltext index.
#[derive(Debug, Clone)]
pub struct KeywordSearch<'a> {
    pub index: &'a str,
    pub keyword: &'a str,
    pub top_k: usize,
}

/// One search result. Higher scores are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub node: GraphNode,
    pub score: f64,
    /// Embedding of the hit node, kept apart from its stripped properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Constraints of a bounded traversal from one entity.
#[derive(Debug, Clone)]
pub struct Traversal<'a> {
    /// Maximum relationship hops; 0 returns the start node alone.
    pub max_depth: usize,
    /// Relationship types never followed.
    pub excluded_types: &'a [&'a str],
    /// Paths touching a node with one of these labels are dropped.
    pub excluded_labels: &'a [&'a str],
    /// Maximum paths returned.
    pub limit: usize,
}

/// A chunk → entity `HAS_ENTITY` link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub chunk: GraphNode,
    pub relationship: GraphRelationship,
    pub entity: GraphNode,
    /// The entity's embedding, kept out of `entity.properties`.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// A membership (`IN_COMMUNITY`) or hierarchy (`PARENT_COMMUNITY`) link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityLink {
    /// Element id of the entity or child community.
    pub from: String,
    pub relationship: GraphRelationship,
    pub community: GraphNode,
}

/// A chunk and its link to the owning document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkLink {
    pub chunk: GraphNode,
    pub relationship: GraphRelationship,
}

/// A chunk together with the document it is part of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedChunk {
    pub chunk: GraphNode,
    pub document: GraphNode,
}

/// Read-only queries the retrieval and export pipelines depend on.
///
/// Unknown ids are never an error: they simply produce no records.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Top `top_k` anchor nodes by similarity to the query embedding.
    async fn vector_search(&self, search: &VectorSearch<'_>) -> Result<Vec<Hit>, AppError>;

    /// Top `top_k` nodes matching a keyword query.
    async fn keyword_search(&self, search: &KeywordSearch<'_>) -> Result<Vec<Hit>, AppError>;

    /// Owning documents of chunks given by element id.
    async fn chunk_documents(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError>;

    /// Entities mentioned by chunks given by element id.
    async fn chunk_entities(&self, chunk_ids: &[String]) -> Result<Vec<EntityMention>, AppError>;

    /// Chunks mentioning entities given by element id.
    async fn entity_chunks(&self, entity_ids: &[String]) -> Result<Vec<EntityMention>, AppError>;

    /// Paths of up to `max_depth` hops starting at an entity, including the
    /// zero-length path. No path repeats a relationship.
    async fn entity_paths(
        &self,
        entity_id: &str,
        traversal: &Traversal<'_>,
    ) -> Result<Vec<GraphPath>, AppError>;

    /// Non-structural relationships whose endpoints are both in `entity_ids`.
    async fn relationships_among(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError>;

    /// Relationships from an entity in `entity_ids` to an entity outside it.
    async fn entity_neighbors(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError>;

    /// Immediate `IN_COMMUNITY` links of entities.
    async fn community_memberships(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError>;

    /// One `PARENT_COMMUNITY` hop up from each community.
    async fn parent_communities(
        &self,
        community_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError>;

    /// Documents by file name, most recently created first.
    async fn documents_by_name(&self, names: &[String]) -> Result<Vec<GraphNode>, AppError>;

    /// Up to `limit` distinct chunks of a document in `position` order, with
    /// every `PART_OF`/`FIRST_CHUNK` link between them and the document.
    async fn document_chunks(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ChunkLink>, AppError>;

    /// `NEXT_CHUNK`/`SIMILAR` relationships with both endpoints in `chunk_ids`.
    async fn chunk_links(&self, chunk_ids: &[String]) -> Result<Vec<GraphRelationship>, AppError>;

    /// Nodes by element id.
    async fn nodes_by_ids(&self, ids: &[String]) -> Result<Vec<GraphNode>, AppError>;

    /// Relationships by element id, with their endpoints.
    async fn relationships_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError>;

    /// Chunks by domain id (`Chunk.id`), with their owning document.
    async fn chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError>;

    /// Number of chunks in a document.
    async fn count_chunks(&self, file_name: &str) -> Result<usize, AppError>;

    /// A page of chunk texts in `position` order.
    async fn chunk_texts(
        &self,
        file_name: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ChunkText>, AppError>;

    /// Distinct entities and entity relationships extracted from a document.
    async fn document_graph_counts(&self, file_name: &str) -> Result<GraphCounts, AppError>;

    /// Entities mentioned by this document and by no other.
    async fn orphaned_entities(&self, file_name: &str) -> Result<Vec<GraphNode>, AppError>;
}
