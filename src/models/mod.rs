//! Domain models for the knowledge graph, retrieval results, and exports.

mod document;
mod export;
mod graph;
mod retrieval;

pub use document::{ChunkText, Document, GraphCounts};
pub use export::{
    ExportNode, ExportRelationship, GlobalCommunityDetails, GraphExport, IdExport,
    LocalCommunityDetails, RelationshipRef,
};
pub use graph::{
    GraphNode, GraphPath, GraphRelationship, Properties, RelationshipRecord, Subgraph,
    CHUNK_LABEL, COMMUNITY_LABEL, DOCUMENT_LABEL, EMBEDDING_PROPERTY, ENTITY_LABEL, FIRST_CHUNK,
    HAS_ENTITY, IN_COMMUNITY, NEXT_CHUNK, PARENT_COMMUNITY, PART_OF, SIMILAR, STRUCTURAL_TYPES,
    TEXT_PROPERTY,
};
pub use retrieval::{
    EntityIds, ItemScore, RetrievalMetadata, RetrievalRequest, RetrievalResult, SourceDetails,
};
