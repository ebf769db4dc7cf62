//! Request and response types of the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A retrieval call: which strategy to run and what to match against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// One of the registered mode identifiers.
    pub mode: String,
    /// Query embedding, same dimensionality as the indexed embeddings.
    pub embedding: Vec<f32>,
    /// Keyword query for modes with a fulltext index.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Restrict chunk search to these documents (modes with `document_filter`).
    #[serde(default)]
    pub document_names: Vec<String>,
}

impl RetrievalRequest {
    pub fn new(mode: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            mode: mode.into(),
            embedding,
            ..Default::default()
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_documents<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Score of one retained context item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    /// Chunk `id` for chunk modes, element id for entity and community modes.
    pub id: String,
    pub score: f64,
}

/// Provenance of one retained group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetails {
    /// Document URL or file name; the element id for self-grouped modes.
    pub source: String,
    /// Mean score of the group's retained items.
    pub score: f64,
    pub items: Vec<ItemScore>,
}

/// Element ids of the entities and relationships folded into the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityIds {
    #[serde(rename = "entityids")]
    pub entity_ids: Vec<String>,
    #[serde(rename = "relationshipids")]
    pub relationship_ids: Vec<String>,
}

/// Structured provenance returned alongside the context text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub mode: String,
    /// Length of the context text in characters.
    pub length: usize,
    /// Source of the best ranked group.
    pub source: Option<String>,
    pub sources: Vec<SourceDetails>,
    /// Every retained item in ranked order.
    pub details: Vec<ItemScore>,
    pub entities: EntityIds,
}

/// The assembled context for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    /// Reported score of the best ranked group: the mean of its retained
    /// items' scores.
    pub score: f64,
    pub metadata: RetrievalMetadata,
}

impl RetrievalResult {
    /// The result of a query that matched nothing.
    pub fn empty(mode: &str) -> Self {
        Self {
            text: String::new(),
            score: 0.0,
            metadata: RetrievalMetadata {
                mode: mode.to_string(),
                ..Default::default()
            },
        }
    }
}
