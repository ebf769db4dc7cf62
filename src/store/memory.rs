//! In-process [`GraphStore`] over a graph loaded from JSON.
//!
//! Answers every query with the same semantics as [`CypherStore`](super::CypherStore):
//! exact cosine scoring stands in for vector indexes and term matching for
//! fulltext indexes. Used by the CLI's `--fixture` mode and by tests.
//!
//! ```json
//! {
//!   "nodes": [{"element_id": "d1", "labels": ["Document"], "properties": {"fileName": "doc1.pdf"}}],
//!   "relationships": [{"element_id": "r1", "type": "PART_OF", "start": "c1", "end": "d1"}]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ChunkLink, CommunityLink, EntityMention, GraphStore, Hit, KeywordSearch, OwnedChunk,
    Traversal, VectorSearch,
};
use crate::error::AppError;
use crate::models::{
    ChunkText, GraphCounts, GraphNode, GraphPath, GraphRelationship, RelationshipRecord,
    CHUNK_LABEL, COMMUNITY_LABEL, DOCUMENT_LABEL, ENTITY_LABEL, FIRST_CHUNK, HAS_ENTITY,
    IN_COMMUNITY, NEXT_CHUNK, PARENT_COMMUNITY, PART_OF, SIMILAR, STRUCTURAL_TYPES,
};
use crate::retrieval::cosine_similarity;

/// A vector index: which label is scored on which property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub label: String,
    pub property: String,
}

/// A fulltext index: which label is matched on which properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndex {
    pub label: String,
    pub properties: Vec<String>,
}

/// Serialized form of an in-memory graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
    /// Extra or overriding vector indexes by name.
    #[serde(default)]
    pub vector_indexes: BTreeMap<String, VectorIndex>,
    /// Extra or overriding fulltext indexes by name.
    #[serde(default)]
    pub keyword_indexes: BTreeMap<String, KeywordIndex>,
}

fn default_vector_indexes() -> BTreeMap<String, VectorIndex> {
    [
        ("vector", CHUNK_LABEL),
        ("entity_vector", ENTITY_LABEL),
        ("community_vector", COMMUNITY_LABEL),
    ]
    .into_iter()
    .map(|(name, label)| {
        (
            name.to_string(),
            VectorIndex {
                label: label.to_string(),
                property: "embedding".to_string(),
            },
        )
    })
    .collect()
}

fn default_keyword_indexes() -> BTreeMap<String, KeywordIndex> {
    [
        ("keyword", CHUNK_LABEL, &["text"][..]),
        ("community_keyword", COMMUNITY_LABEL, &["summary"][..]),
        ("entities", ENTITY_LABEL, &["id", "description"][..]),
    ]
    .into_iter()
    .map(|(name, label, props)| {
        (
            name.to_string(),
            KeywordIndex {
                label: label.to_string(),
                properties: props.iter().map(|p| p.to_string()).collect(),
            },
        )
    })
    .collect()
}

/// Lowercased alphanumeric terms of a text.
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// In-memory graph store.
pub struct MemoryStore {
    nodes: BTreeMap<String, GraphNode>,
    relationships: BTreeMap<String, GraphRelationship>,
    /// Node element id → incident relationship ids, sorted.
    adjacency: HashMap<String, Vec<String>>,
    vector_indexes: BTreeMap<String, VectorIndex>,
    keyword_indexes: BTreeMap<String, KeywordIndex>,
    latency: Option<Duration>,
    queries: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Marks one query as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// Builds a store, rejecting relationships with unknown endpoints.
    pub fn new(graph: MemoryGraph) -> Result<Self, AppError> {
        let mut nodes = BTreeMap::new();
        for node in graph.nodes {
            if nodes.contains_key(&node.element_id) {
                return Err(AppError::Validation(format!(
                    "duplicate node element id: {}",
                    node.element_id
                )));
            }
            nodes.insert(node.element_id.clone(), node);
        }

        let mut relationships = BTreeMap::new();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for rel in graph.relationships {
            for endpoint in [&rel.start, &rel.end] {
                if !nodes.contains_key(endpoint) {
                    return Err(AppError::Validation(format!(
                        "relationship {} references unknown node {}",
                        rel.element_id, endpoint
                    )));
                }
            }
            adjacency
                .entry(rel.start.clone())
                .or_default()
                .push(rel.element_id.clone());
            if rel.end != rel.start {
                adjacency
                    .entry(rel.end.clone())
                    .or_default()
                    .push(rel.element_id.clone());
            }
            relationships.insert(rel.element_id.clone(), rel);
        }
        for rels in adjacency.values_mut() {
            rels.sort();
            rels.dedup();
        }

        let mut vector_indexes = default_vector_indexes();
        vector_indexes.extend(graph.vector_indexes);
        let mut keyword_indexes = default_keyword_indexes();
        keyword_indexes.extend(graph.keyword_indexes);

        tracing::debug!(
            nodes = nodes.len(),
            relationships = relationships.len(),
            "Loaded in-memory graph"
        );

        Ok(Self {
            nodes,
            relationships,
            adjacency,
            vector_indexes,
            keyword_indexes,
            latency: None,
            queries: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Parses a JSON fixture.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let graph: MemoryGraph = serde_json::from_str(json)
            .map_err(|e| AppError::Validation(format!("invalid graph fixture: {}", e)))?;
        Self::new(graph)
    }

    /// Delays every query, to exercise deadlines and cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Most queries ever answered at the same time. Overlap is only
    /// observable when the store has a latency.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn tick(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Nodes leave the store without their embedding.
    fn public(&self, id: &str) -> Option<GraphNode> {
        self.nodes.get(id).map(|n| n.clone().without_embedding())
    }

    fn incident(&self, node_id: &str) -> impl Iterator<Item = &GraphRelationship> {
        self.adjacency
            .get(node_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
    }

    fn outgoing<'a>(
        &'a self,
        node_id: &'a str,
        types: &'a [&'a str],
    ) -> impl Iterator<Item = &'a GraphRelationship> + 'a {
        self.incident(node_id)
            .filter(move |r| r.start == node_id && types.contains(&r.rel_type.as_str()))
    }

    fn incoming<'a>(
        &'a self,
        node_id: &'a str,
        types: &'a [&'a str],
    ) -> impl Iterator<Item = &'a GraphRelationship> + 'a {
        self.incident(node_id)
            .filter(move |r| r.end == node_id && types.contains(&r.rel_type.as_str()))
    }

    fn has_label(&self, id: &str, label: &str) -> bool {
        self.nodes.get(id).map(|n| n.has_label(label)).unwrap_or(false)
    }

    fn record(&self, rel: &GraphRelationship) -> Option<RelationshipRecord> {
        Some(RelationshipRecord {
            relationship: rel.clone(),
            start: self.public(&rel.start)?,
            end: self.public(&rel.end)?,
        })
    }

    fn document_by_file(&self, file_name: &str) -> Option<&GraphNode> {
        self.nodes
            .values()
            .find(|n| n.has_label(DOCUMENT_LABEL) && n.str_prop("fileName") == Some(file_name))
    }

    /// Chunks `PART_OF` a document, in `position` order.
    fn chunks_of(&self, document_id: &str) -> Vec<&GraphNode> {
        let mut chunks: Vec<&GraphNode> = self
            .incoming(document_id, &[PART_OF])
            .filter_map(|r| self.nodes.get(&r.start))
            .filter(|n| n.has_label(CHUNK_LABEL))
            .collect();
        chunks.sort_by(|a, b| {
            a.position()
                .cmp(&b.position())
                .then_with(|| a.element_id.cmp(&b.element_id))
        });
        chunks.dedup_by(|a, b| a.element_id == b.element_id);
        chunks
    }

    /// Distinct entities mentioned by a document's chunks.
    fn document_entities(&self, document_id: &str) -> BTreeSet<String> {
        self.chunks_of(document_id)
            .into_iter()
            .flat_map(|c| self.outgoing(&c.element_id, &[HAS_ENTITY]))
            .map(|r| r.end.clone())
            .collect()
    }

    fn owner_of(&self, chunk_id: &str) -> Option<OwnedChunk> {
        let rel = self.outgoing(chunk_id, &[PART_OF]).find(|r| self.has_label(&r.end, DOCUMENT_LABEL))?;
        Some(OwnedChunk {
            chunk: self.public(chunk_id)?,
            document: self.public(&rel.end)?,
        })
    }

    fn mention(&self, rel: &GraphRelationship) -> Option<EntityMention> {
        if !self.has_label(&rel.start, CHUNK_LABEL) {
            return None;
        }
        let entity = self.nodes.get(&rel.end)?;
        Some(EntityMention {
            chunk: self.public(&rel.start)?,
            relationship: rel.clone(),
            entity: entity.clone().without_embedding(),
            embedding: entity.embedding(),
        })
    }

    fn sort_mentions(mentions: &mut [EntityMention]) {
        mentions.sort_by(|a, b| {
            (&a.chunk.element_id, &a.entity.element_id, &a.relationship.element_id).cmp(&(
                &b.chunk.element_id,
                &b.entity.element_id,
                &b.relationship.element_id,
            ))
        });
    }

    fn community_links(&self, rel_type: &str, ids: &[String]) -> Vec<CommunityLink> {
        let from: BTreeSet<&String> = ids.iter().collect();
        let mut links = Vec::new();
        for id in from {
            for rel in self.outgoing(id, &[rel_type]) {
                if !self.has_label(&rel.end, COMMUNITY_LABEL) {
                    continue;
                }
                if let Some(community) = self.public(&rel.end) {
                    links.push(CommunityLink {
                        from: id.clone(),
                        relationship: rel.clone(),
                        community,
                    });
                }
            }
        }
        links.sort_by(|a, b| {
            (&a.from, &a.community.element_id, &a.relationship.element_id).cmp(&(
                &b.from,
                &b.community.element_id,
                &b.relationship.element_id,
            ))
        });
        links
    }

    fn excluded_node(&self, id: &str, traversal: &Traversal<'_>) -> bool {
        match self.nodes.get(id) {
            Some(node) => traversal.excluded_labels.iter().any(|l| node.has_label(l)),
            None => true,
        }
    }

    fn to_path(&self, nodes: &[String], rels: &[String]) -> GraphPath {
        GraphPath {
            nodes: nodes.iter().filter_map(|id| self.public(id)).collect(),
            relationships: rels
                .iter()
                .filter_map(|id| self.relationships.get(id).cloned())
                .collect(),
        }
    }

    /// Depth-first enumeration of trails (no repeated relationship).
    fn walk(
        &self,
        nodes: &mut Vec<String>,
        rels: &mut Vec<String>,
        traversal: &Traversal<'_>,
        out: &mut Vec<GraphPath>,
    ) {
        out.push(self.to_path(nodes, rels));
        if rels.len() >= traversal.max_depth {
            return;
        }

        let Some(current) = nodes.last().cloned() else {
            return;
        };
        for rel in self.incident(&current) {
            if traversal.excluded_types.contains(&rel.rel_type.as_str())
                || rels.contains(&rel.element_id)
            {
                continue;
            }
            let Some(next) = rel.other_end(&current) else {
                continue;
            };
            if self.excluded_node(next, traversal) {
                continue;
            }
            nodes.push(next.to_string());
            rels.push(rel.element_id.clone());
            self.walk(nodes, rels, traversal, out);
            nodes.pop();
            rels.pop();
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn vector_search(&self, search: &VectorSearch<'_>) -> Result<Vec<Hit>, AppError> {
        self.tick().await;

        let candidates: Vec<&GraphNode> = if search.document_names.is_empty() {
            let index = self.vector_indexes.get(search.index).ok_or_else(|| AppError::Query {
                message: format!("no such vector index: {}", search.index),
                query: "vector_search".to_string(),
            })?;
            self.nodes
                .values()
                .filter(|n| n.has_label(&index.label))
                .collect()
        } else {
            self.nodes
                .values()
                .filter(|n| n.has_label(search.label))
                .filter(|n| {
                    self.outgoing(&n.element_id, &[PART_OF]).any(|r| {
                        self.nodes
                            .get(&r.end)
                            .and_then(|d| d.str_prop("fileName"))
                            .map(|name| search.document_names.iter().any(|f| f == name))
                            .unwrap_or(false)
                    })
                })
                .collect()
        };

        let mut hits: Vec<Hit> = candidates
            .into_iter()
            .filter_map(|n| {
                let embedding = n.embedding()?;
                Some(Hit {
                    score: cosine_similarity(&embedding, search.embedding) as f64,
                    node: n.clone().without_embedding(),
                    embedding: Some(embedding),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.element_id.cmp(&b.node.element_id))
        });
        hits.truncate(search.top_k);
        Ok(hits)
    }

    async fn keyword_search(&self, search: &KeywordSearch<'_>) -> Result<Vec<Hit>, AppError> {
        self.tick().await;

        let index = self.keyword_indexes.get(search.index).ok_or_else(|| AppError::Query {
            message: format!("no such fulltext index: {}", search.index),
            query: "keyword_search".to_string(),
        })?;
        let wanted: BTreeSet<String> = terms(search.keyword).into_iter().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let fields: Vec<&str> = index.properties.iter().map(String::as_str).collect();
        let mut hits: Vec<Hit> = self
            .nodes
            .values()
            .filter(|n| n.has_label(&index.label))
            .filter_map(|n| {
                let present: BTreeSet<String> = terms(&n.text_of(&fields)).into_iter().collect();
                let matched = wanted.intersection(&present).count();
                (matched > 0).then(|| Hit {
                    score: matched as f64 / wanted.len() as f64,
                    node: n.clone().without_embedding(),
                    embedding: n.embedding(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.element_id.cmp(&b.node.element_id))
        });
        hits.truncate(search.top_k);
        Ok(hits)
    }

    async fn chunk_documents(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&String> = chunk_ids.iter().collect();
        Ok(ids.into_iter().filter_map(|id| self.owner_of(id)).collect())
    }

    async fn chunk_entities(&self, chunk_ids: &[String]) -> Result<Vec<EntityMention>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&String> = chunk_ids.iter().collect();
        let mut mentions: Vec<EntityMention> = ids
            .into_iter()
            .flat_map(|id| self.outgoing(id, &[HAS_ENTITY]))
            .filter_map(|r| self.mention(r))
            .collect();
        Self::sort_mentions(&mut mentions);
        Ok(mentions)
    }

    async fn entity_chunks(&self, entity_ids: &[String]) -> Result<Vec<EntityMention>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&String> = entity_ids.iter().collect();
        let mut mentions: Vec<EntityMention> = ids
            .into_iter()
            .flat_map(|id| self.incoming(id, &[HAS_ENTITY]))
            .filter_map(|r| self.mention(r))
            .collect();
        Self::sort_mentions(&mut mentions);
        Ok(mentions)
    }

    async fn entity_paths(
        &self,
        entity_id: &str,
        traversal: &Traversal<'_>,
    ) -> Result<Vec<GraphPath>, AppError> {
        self.tick().await;
        let mut out = Vec::new();
        if traversal.limit == 0 || self.excluded_node(entity_id, traversal) {
            return Ok(out);
        }
        let mut nodes = vec![entity_id.to_string()];
        let mut rels = Vec::new();
        self.walk(&mut nodes, &mut rels, traversal, &mut out);
        // Shortest first, then by relationship ids, before the cap applies
        out.sort_by(|a, b| {
            a.len().cmp(&b.len()).then_with(|| {
                a.relationships
                    .iter()
                    .map(|r| &r.element_id)
                    .cmp(b.relationships.iter().map(|r| &r.element_id))
            })
        });
        out.truncate(traversal.limit);
        Ok(out)
    }

    async fn relationships_among(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&str> = entity_ids.iter().map(String::as_str).collect();
        Ok(self
            .relationships
            .values()
            .filter(|r| !STRUCTURAL_TYPES.contains(&r.rel_type.as_str()))
            .filter(|r| ids.contains(r.start.as_str()) && ids.contains(r.end.as_str()))
            .filter_map(|r| self.record(r))
            .collect())
    }

    async fn entity_neighbors(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&str> = entity_ids.iter().map(String::as_str).collect();
        Ok(self
            .relationships
            .values()
            .filter(|r| !STRUCTURAL_TYPES.contains(&r.rel_type.as_str()))
            .filter(|r| {
                let (start_in, end_in) = (ids.contains(r.start.as_str()), ids.contains(r.end.as_str()));
                (start_in && !end_in && self.has_label(&r.end, ENTITY_LABEL))
                    || (end_in && !start_in && self.has_label(&r.start, ENTITY_LABEL))
            })
            .filter_map(|r| self.record(r))
            .collect())
    }

    async fn community_memberships(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError> {
        self.tick().await;
        Ok(self.community_links(IN_COMMUNITY, entity_ids))
    }

    async fn parent_communities(
        &self,
        community_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError> {
        self.tick().await;
        Ok(self.community_links(PARENT_COMMUNITY, community_ids))
    }

    async fn documents_by_name(&self, names: &[String]) -> Result<Vec<GraphNode>, AppError> {
        self.tick().await;
        let mut docs: Vec<GraphNode> = self
            .nodes
            .values()
            .filter(|n| n.has_label(DOCUMENT_LABEL))
            .filter(|n| {
                n.str_prop("fileName")
                    .map(|f| names.iter().any(|name| name == f))
                    .unwrap_or(false)
            })
            .map(|n| n.clone().without_embedding())
            .collect();
        docs.sort_by(|a, b| {
            b.str_prop("createdAt")
                .cmp(&a.str_prop("createdAt"))
                .then_with(|| a.element_id.cmp(&b.element_id))
        });
        Ok(docs)
    }

    async fn document_chunks(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ChunkLink>, AppError> {
        self.tick().await;
        let links: Vec<&GraphRelationship> = self
            .incoming(document_id, &[PART_OF, FIRST_CHUNK])
            .filter(|r| self.has_label(&r.start, CHUNK_LABEL))
            .collect();

        let mut chunks: Vec<&GraphNode> = links
            .iter()
            .filter_map(|r| self.nodes.get(&r.start))
            .collect();
        chunks.sort_by(|a, b| {
            a.position()
                .cmp(&b.position())
                .then_with(|| a.element_id.cmp(&b.element_id))
        });
        chunks.dedup_by(|a, b| a.element_id == b.element_id);
        chunks.truncate(limit);

        let mut out = Vec::new();
        for chunk in chunks {
            let mut rels: Vec<&&GraphRelationship> = links
                .iter()
                .filter(|r| r.start == chunk.element_id)
                .collect();
            rels.sort_by(|a, b| a.element_id.cmp(&b.element_id));
            for rel in rels {
                out.push(ChunkLink {
                    chunk: chunk.clone().without_embedding(),
                    relationship: (*rel).clone(),
                });
            }
        }
        Ok(out)
    }

    async fn chunk_links(&self, chunk_ids: &[String]) -> Result<Vec<GraphRelationship>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        Ok(self
            .relationships
            .values()
            .filter(|r| r.rel_type == NEXT_CHUNK || r.rel_type == SIMILAR)
            .filter(|r| ids.contains(r.start.as_str()) && ids.contains(r.end.as_str()))
            .filter(|r| self.has_label(&r.start, CHUNK_LABEL) && self.has_label(&r.end, CHUNK_LABEL))
            .cloned()
            .collect())
    }

    async fn nodes_by_ids(&self, ids: &[String]) -> Result<Vec<GraphNode>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&String> = ids.iter().collect();
        Ok(ids.into_iter().filter_map(|id| self.public(id)).collect())
    }

    async fn relationships_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        self.tick().await;
        let ids: BTreeSet<&String> = ids.iter().collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.relationships.get(id))
            .filter_map(|r| self.record(r))
            .collect())
    }

    async fn chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError> {
        self.tick().await;
        let mut owned: Vec<OwnedChunk> = self
            .nodes
            .values()
            .filter(|n| n.has_label(CHUNK_LABEL))
            .filter(|n| chunk_ids.iter().any(|id| Some(id.as_str()) == n.str_prop("id")))
            .filter_map(|n| self.owner_of(&n.element_id))
            .collect();
        owned.sort_by(|a, b| {
            a.chunk
                .position()
                .cmp(&b.chunk.position())
                .then_with(|| a.chunk.element_id.cmp(&b.chunk.element_id))
        });
        Ok(owned)
    }

    async fn count_chunks(&self, file_name: &str) -> Result<usize, AppError> {
        self.tick().await;
        Ok(self
            .document_by_file(file_name)
            .map(|d| self.chunks_of(&d.element_id).len())
            .unwrap_or(0))
    }

    async fn chunk_texts(
        &self,
        file_name: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ChunkText>, AppError> {
        self.tick().await;
        let Some(doc) = self.document_by_file(file_name) else {
            return Ok(Vec::new());
        };
        Ok(self
            .chunks_of(&doc.element_id)
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|c| ChunkText {
                text: c.str_prop("text").unwrap_or_default().to_string(),
                position: c.position().unwrap_or_default(),
                page_number: c.properties.get("page_number").and_then(|v| v.as_i64()),
            })
            .collect())
    }

    async fn document_graph_counts(&self, file_name: &str) -> Result<GraphCounts, AppError> {
        self.tick().await;
        let Some(doc) = self.document_by_file(file_name) else {
            return Ok(GraphCounts::default());
        };
        let entities = self.document_entities(&doc.element_id);
        let rels = self
            .relationships
            .values()
            .filter(|r| entities.contains(&r.start) && entities.contains(&r.end))
            .filter(|r| !self.has_label(&r.start, CHUNK_LABEL) && !self.has_label(&r.end, CHUNK_LABEL))
            .count();
        Ok(GraphCounts {
            nodes: entities.len(),
            rels,
        })
    }

    async fn orphaned_entities(&self, file_name: &str) -> Result<Vec<GraphNode>, AppError> {
        self.tick().await;
        let Some(doc) = self.document_by_file(file_name) else {
            return Ok(Vec::new());
        };
        let mentioned_elsewhere = |entity: &str| {
            self.incoming(entity, &[HAS_ENTITY]).any(|mention| {
                self.outgoing(&mention.start, &[PART_OF])
                    .any(|part| part.end != doc.element_id && self.has_label(&part.end, DOCUMENT_LABEL))
            })
        };
        Ok(self
            .document_entities(&doc.element_id)
            .into_iter()
            .filter(|e| !mentioned_elsewhere(e))
            .filter_map(|e| self.public(&e))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let graph = json!({
            "nodes": [
                {"element_id": "d1", "labels": ["Document"], "properties": {"fileName": "doc1.pdf", "createdAt": "2024-01-01"}},
                {"element_id": "d2", "labels": ["Document"], "properties": {"fileName": "doc2.pdf", "createdAt": "2024-02-01"}},
                {"element_id": "c1", "labels": ["Chunk"], "properties": {"id": "k1", "text": "analytical engine", "position": 2, "embedding": [1.0, 0.0]}},
                {"element_id": "c2", "labels": ["Chunk"], "properties": {"id": "k2", "text": "difference engine", "position": 1, "embedding": [0.0, 1.0]}},
                {"element_id": "c3", "labels": ["Chunk"], "properties": {"id": "k3", "text": "poetry", "position": 1, "embedding": [0.7, 0.7]}},
                {"element_id": "e1", "labels": ["__Entity__", "Person"], "properties": {"id": "Ada", "embedding": [1.0, 0.0]}},
                {"element_id": "e2", "labels": ["__Entity__", "Machine"], "properties": {"id": "Engine"}},
                {"element_id": "e3", "labels": ["__Entity__", "Person"], "properties": {"id": "Byron"}}
            ],
            "relationships": [
                {"element_id": "p1", "type": "PART_OF", "start": "c1", "end": "d1"},
                {"element_id": "p2", "type": "PART_OF", "start": "c2", "end": "d1"},
                {"element_id": "p3", "type": "PART_OF", "start": "c3", "end": "d2"},
                {"element_id": "h1", "type": "HAS_ENTITY", "start": "c1", "end": "e1"},
                {"element_id": "h2", "type": "HAS_ENTITY", "start": "c1", "end": "e2"},
                {"element_id": "h3", "type": "HAS_ENTITY", "start": "c3", "end": "e1"},
                {"element_id": "r1", "type": "DESIGNED", "start": "e1", "end": "e2"},
                {"element_id": "r2", "type": "CHILD_OF", "start": "e1", "end": "e3"}
            ]
        });
        MemoryStore::new(serde_json::from_value(graph).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_cosine_and_strips_embedding() {
        let store = store();
        let hits = store
            .vector_search(&VectorSearch {
                index: "vector",
                label: "Chunk",
                embedding_field: "embedding",
                embedding: &[1.0, 0.0],
                top_k: 2,
                document_names: &[],
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.element_id, "c1");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].node.properties.get("embedding").is_none());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_document_filter() {
        let store = store();
        let names = vec!["doc2.pdf".to_string()];
        let hits = store
            .vector_search(&VectorSearch {
                index: "vector",
                label: "Chunk",
                embedding_field: "embedding",
                embedding: &[1.0, 0.0],
                top_k: 10,
                document_names: &names,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.element_id, "c3");
    }

    #[tokio::test]
    async fn test_keyword_search_scores_term_overlap() {
        let store = store();
        let hits = store
            .keyword_search(&KeywordSearch {
                index: "keyword",
                keyword: "Analytical Engine",
                top_k: 10,
            })
            .await
            .unwrap();
        assert_eq!(hits[0].node.element_id, "c1");
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].node.element_id, "c2");
        assert_eq!(hits[1].score, 0.5);
    }

    #[tokio::test]
    async fn test_entity_mentions_carry_embedding_separately() {
        let store = store();
        let mentions = store.chunk_entities(&["c1".to_string()]).await.unwrap();
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].entity.element_id, "e1");
        assert_eq!(mentions[0].embedding, Some(vec![1.0, 0.0]));
        assert!(mentions[0].entity.properties.get("embedding").is_none());
        assert_eq!(mentions[1].embedding, None);
    }

    #[tokio::test]
    async fn test_entity_paths_respect_exclusions_and_depth() {
        let store = store();
        let traversal = Traversal {
            max_depth: 2,
            excluded_types: &[HAS_ENTITY, PART_OF],
            excluded_labels: &[CHUNK_LABEL, DOCUMENT_LABEL, COMMUNITY_LABEL],
            limit: 100,
        };
        let paths = store.entity_paths("e2", &traversal).await.unwrap();
        // e2, e2-e1, e2-e1-e3
        assert_eq!(paths.len(), 3);
        assert!(paths[0].is_empty());
        assert!(paths
            .iter()
            .flat_map(|p| &p.nodes)
            .all(|n| !n.has_label(CHUNK_LABEL)));
        assert_eq!(paths.iter().map(GraphPath::len).max(), Some(2));
    }

    #[tokio::test]
    async fn test_entity_paths_cap_keeps_shortest_paths() {
        let store = MemoryStore::new(
            serde_json::from_value(json!({
                "nodes": [
                    {"element_id": "x", "labels": ["__Entity__"], "properties": {"id": "x"}},
                    {"element_id": "y", "labels": ["__Entity__"], "properties": {"id": "y"}},
                    {"element_id": "z", "labels": ["__Entity__"], "properties": {"id": "z"}},
                    {"element_id": "w", "labels": ["__Entity__"], "properties": {"id": "w"}}
                ],
                "relationships": [
                    {"element_id": "a", "type": "KNOWS", "start": "x", "end": "y"},
                    {"element_id": "b", "type": "KNOWS", "start": "y", "end": "z"},
                    {"element_id": "c", "type": "KNOWS", "start": "x", "end": "w"}
                ]
            }))
            .unwrap(),
        )
        .unwrap();
        let traversal = Traversal {
            max_depth: 2,
            excluded_types: &[],
            excluded_labels: &[],
            limit: 3,
        };

        let paths = store.entity_paths("x", &traversal).await.unwrap();
        let rel_ids: Vec<Vec<&str>> = paths
            .iter()
            .map(|p| p.relationships.iter().map(|r| r.element_id.as_str()).collect())
            .collect();
        // x-y-z is longer than x-w, so the cap drops it
        assert_eq!(rel_ids, vec![vec![], vec!["a"], vec!["c"]]);
    }

    #[tokio::test]
    async fn test_document_chunks_in_position_order_with_limit() {
        let store = store();
        let links = store.document_chunks("d1", 1).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].chunk.element_id, "c2");
    }

    #[tokio::test]
    async fn test_documents_newest_first() {
        let store = store();
        let docs = store
            .documents_by_name(&["doc1.pdf".to_string(), "doc2.pdf".to_string()])
            .await
            .unwrap();
        assert_eq!(docs[0].element_id, "d2");
        assert_eq!(docs[1].element_id, "d1");
    }

    #[tokio::test]
    async fn test_document_helpers() {
        let store = store();
        assert_eq!(store.count_chunks("doc1.pdf").await.unwrap(), 2);
        let texts = store.chunk_texts("doc1.pdf", 0, 10).await.unwrap();
        assert_eq!(texts[0].text, "difference engine");
        assert_eq!(texts[1].position, 2);

        let counts = store.document_graph_counts("doc1.pdf").await.unwrap();
        assert_eq!(counts, GraphCounts { nodes: 2, rels: 1 });

        let orphans = store.orphaned_entities("doc1.pdf").await.unwrap();
        let ids: Vec<&str> = orphans.iter().map(|n| n.element_id.as_str()).collect();
        assert_eq!(ids, vec!["e2"]);
    }

    #[test]
    fn test_dangling_relationship_is_rejected() {
        let graph = MemoryGraph {
            relationships: vec![GraphRelationship::new("r", "KNOWS", "a", "b")],
            ..Default::default()
        };
        assert!(matches!(MemoryStore::new(graph), Err(AppError::Validation(_))));
    }
}
