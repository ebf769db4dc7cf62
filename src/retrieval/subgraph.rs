//! Bounded entity-neighborhood expansion around seed chunks or entities.

use std::collections::HashMap;

use futures::{StreamExt, TryStreamExt};
use tokio::sync::Semaphore;

use crate::config::RetrievalConfig;
use crate::error::{AppError, Degradation};
use crate::models::{
    GraphNode, GraphPath, Subgraph, CHUNK_LABEL, COMMUNITY_LABEL, DOCUMENT_LABEL, HAS_ENTITY,
    PART_OF,
};
use crate::store::{GraphStore, Traversal};

use super::aggregate::cosine_similarity;

/// Hard ceiling on entity expansion depth, whatever the configuration says.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

const EXCLUDED_TYPES: &[&str] = &[HAS_ENTITY, PART_OF];
const EXCLUDED_LABELS: &[&str] = &[CHUNK_LABEL, DOCUMENT_LABEL, COMMUNITY_LABEL];

/// An entity to expand, with its similarity to the query when known.
#[derive(Debug, Clone)]
pub struct EntitySeed {
    pub node: GraphNode,
    /// `None` when the entity has no embedding.
    pub similarity: Option<f32>,
}

/// Whether a seed is worth a neighborhood traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Traverse,
    Bare,
}

/// Expands seeds into a deduplicated [`Subgraph`].
///
/// Store queries issued through one collector share a single permit pool
/// of `retrieval.concurrency` slots, however many groups expand at once.
pub struct SubgraphCollector<'a> {
    store: &'a dyn GraphStore,
    config: &'a RetrievalConfig,
    permits: Semaphore,
}

impl<'a> SubgraphCollector<'a> {
    pub fn new(store: &'a dyn GraphStore, config: &'a RetrievalConfig) -> Self {
        Self {
            store,
            config,
            permits: Semaphore::new(config.concurrency.max(1)),
        }
    }

    /// Classifies a seed: only entities whose similarity exceeds the
    /// threshold are expanded.
    pub fn classify(&self, seed: &EntitySeed) -> Expansion {
        match seed.similarity {
            Some(similarity) if similarity > self.config.embedding_match_min => Expansion::Traverse,
            _ => Expansion::Bare,
        }
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, AppError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| AppError::Internal("store permit pool closed".to_string()))
    }

    fn traversal(&self) -> Traversal<'static> {
        let mut depth = self.config.traversal_depth;
        if depth > MAX_TRAVERSAL_DEPTH {
            Degradation::TraversalDepthExceeded {
                walk: "entity neighborhood",
                cap: MAX_TRAVERSAL_DEPTH,
            }
            .report();
            depth = MAX_TRAVERSAL_DEPTH;
        }
        Traversal {
            max_depth: depth,
            excluded_types: EXCLUDED_TYPES,
            excluded_labels: EXCLUDED_LABELS,
            limit: self.config.entity_path_limit,
        }
    }

    /// Expands the entities mentioned by a group of chunks.
    ///
    /// Entities are ranked by how many of the chunks mention them (ties by
    /// element id) and capped at the configured entity limit before expansion.
    #[tracing::instrument(skip(self, chunk_ids, query), fields(chunks = chunk_ids.len()))]
    pub async fn expand_chunks(
        &self,
        chunk_ids: &[String],
        query: &[f32],
    ) -> Result<Subgraph, AppError> {
        let mentions = {
            let _permit = self.permit().await?;
            self.store.chunk_entities(chunk_ids).await?
        };

        // entity element id -> (entity, embedding, mentioning chunks)
        let mut entities: HashMap<String, (GraphNode, Option<Vec<f32>>, Vec<String>)> =
            HashMap::new();
        for mention in mentions {
            let entry = entities
                .entry(mention.entity.element_id.clone())
                .or_insert_with(|| (mention.entity, mention.embedding, Vec::new()));
            if !entry.2.contains(&mention.chunk.element_id) {
                entry.2.push(mention.chunk.element_id);
            }
        }

        let mut ranked: Vec<(GraphNode, Option<Vec<f32>>, usize)> = entities
            .into_values()
            .map(|(node, embedding, chunks)| (node, embedding, chunks.len()))
            .collect();
        ranked.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.0.element_id.cmp(&b.0.element_id))
        });
        if ranked.len() > self.config.entity_limit {
            tracing::debug!(
                found = ranked.len(),
                kept = self.config.entity_limit,
                "Entity list capped by frequency"
            );
            ranked.truncate(self.config.entity_limit);
        }

        let seeds = ranked
            .into_iter()
            .map(|(node, embedding, _)| EntitySeed {
                similarity: embedding.map(|e| cosine_similarity(&e, query)),
                node,
            })
            .collect();
        self.expand_entities(seeds).await
    }

    /// Expands seeds: qualifying entities are traversed, the rest are kept
    /// as bare nodes. Traversals run concurrently; the result does not
    /// depend on their completion order.
    pub async fn expand_entities(&self, seeds: Vec<EntitySeed>) -> Result<Subgraph, AppError> {
        let traversal = self.traversal();
        let mut graph = Subgraph::new();
        let mut to_traverse = Vec::new();

        for seed in seeds {
            match self.classify(&seed) {
                Expansion::Traverse => to_traverse.push(seed.node),
                Expansion::Bare => graph.add_path(GraphPath::single(seed.node)),
            }
        }
        let bare = graph.node_count();

        let traversal = &traversal;
        let path_sets: Vec<Vec<GraphPath>> = futures::stream::iter(to_traverse.iter().map(
            |entity| async move {
                let paths = {
                    let _permit = self.permit().await?;
                    self.store.entity_paths(&entity.element_id, traversal).await?
                };
                if paths.len() >= traversal.limit {
                    tracing::debug!(
                        entity = %entity.element_id,
                        limit = traversal.limit,
                        "Path limit reached"
                    );
                }
                Ok::<_, AppError>(paths)
            },
        ))
        .buffered(self.config.concurrency.max(1))
        .try_collect()
        .await?;

        for (entity, paths) in to_traverse.into_iter().zip(path_sets) {
            // The zero-length path is absent when the store filtered the start
            graph.add_node(entity);
            for path in paths {
                graph.add_path(path);
            }
        }

        tracing::debug!(
            bare,
            nodes = graph.node_count(),
            relationships = graph.relationship_count(),
            "Expanded entity neighborhoods"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(
            serde_json::from_value(json!({
                "nodes": [
                    {"element_id": "c1", "labels": ["Chunk"], "properties": {"id": "k1", "text": "a"}},
                    {"element_id": "c2", "labels": ["Chunk"], "properties": {"id": "k2", "text": "b"}},
                    {"element_id": "e1", "labels": ["__Entity__", "Person"], "properties": {"id": "Ada", "embedding": [1.0, 0.0]}},
                    {"element_id": "e2", "labels": ["__Entity__", "Machine"], "properties": {"id": "Engine"}},
                    {"element_id": "e3", "labels": ["__Entity__", "Person"], "properties": {"id": "Babbage", "embedding": [0.0, 1.0]}},
                    {"element_id": "e4", "labels": ["__Entity__", "Place"], "properties": {"id": "London"}},
                    {"element_id": "m1", "labels": ["__Community__"], "properties": {"id": "m1", "summary": "s"}}
                ],
                "relationships": [
                    {"element_id": "h1", "type": "HAS_ENTITY", "start": "c1", "end": "e1"},
                    {"element_id": "h2", "type": "HAS_ENTITY", "start": "c2", "end": "e1"},
                    {"element_id": "h3", "type": "HAS_ENTITY", "start": "c1", "end": "e2"},
                    {"element_id": "h4", "type": "HAS_ENTITY", "start": "c2", "end": "e3"},
                    {"element_id": "r1", "type": "WORKED_WITH", "start": "e1", "end": "e3"},
                    {"element_id": "r2", "type": "DESIGNED", "start": "e3", "end": "e2"},
                    {"element_id": "r3", "type": "LIVED_IN", "start": "e2", "end": "e4"},
                    {"element_id": "i1", "type": "IN_COMMUNITY", "start": "e1", "end": "m1"}
                ]
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_entity_without_embedding_stays_bare() {
        let store = store();
        let config = RetrievalConfig::default();
        let collector = SubgraphCollector::new(&store, &config);

        // Only c1's entities: e1 (similar) and e2 (no embedding)
        let graph = collector
            .expand_chunks(&["c1".to_string()], &[1.0, 0.0])
            .await
            .unwrap();

        // e1 expands: e1-e3 (r1), e1-e3-e2 (r2); never into the community
        assert!(graph.contains_node("e1"));
        assert!(graph.contains_node("e2"));
        assert!(graph.contains_node("e3"));
        assert!(!graph.contains_node("m1"));
        assert!(!graph.contains_node("c1"));
        // e2 itself was not expanded, so London is not reached through it
        assert!(!graph.contains_node("e4"));
        assert_eq!(graph.relationship_ids(), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_dissimilar_entity_stays_bare() {
        let store = store();
        let config = RetrievalConfig::default();
        let collector = SubgraphCollector::new(&store, &config);

        // e3 is orthogonal to the query
        let graph = collector
            .expand_entities(vec![EntitySeed {
                node: GraphNode::new("e3", &["__Entity__", "Person"], Default::default()),
                similarity: Some(0.0),
            }])
            .await
            .unwrap();
        assert_eq!(graph.node_ids(), vec!["e3"]);
        assert_eq!(graph.relationship_count(), 0);
    }

    #[tokio::test]
    async fn test_entity_limit_keeps_most_frequent() {
        let store = store();
        let config = RetrievalConfig {
            entity_limit: 1,
            traversal_depth: 0,
            ..Default::default()
        };
        let collector = SubgraphCollector::new(&store, &config);

        // e1 is mentioned by both chunks, e2 and e3 by one each
        let graph = collector
            .expand_chunks(&["c1".to_string(), "c2".to_string()], &[1.0, 0.0])
            .await
            .unwrap();
        assert_eq!(graph.node_ids(), vec!["e1"]);
    }

    #[tokio::test]
    async fn test_shared_neighborhood_is_deduplicated() {
        let store = store();
        let config = RetrievalConfig::default();
        let collector = SubgraphCollector::new(&store, &config);

        let seed = |id: &str| EntitySeed {
            node: GraphNode::new(id, &["__Entity__"], Default::default()),
            similarity: Some(1.0),
        };
        let graph = collector
            .expand_entities(vec![seed("e1"), seed("e3")])
            .await
            .unwrap();

        let ids = graph.node_ids();
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(ids, unique);
        assert!(graph.relationship_ids().contains(&"r1".to_string()));
    }

    #[test]
    fn test_similarity_must_exceed_threshold() {
        let store = store();
        let config = RetrievalConfig {
            embedding_match_min: 0.5,
            ..Default::default()
        };
        let collector = SubgraphCollector::new(&store, &config);
        let seed = |similarity| EntitySeed {
            node: GraphNode::new("e1", &["__Entity__"], Default::default()),
            similarity,
        };

        assert_eq!(collector.classify(&seed(Some(0.5))), Expansion::Bare);
        assert_eq!(collector.classify(&seed(Some(0.51))), Expansion::Traverse);
        assert_eq!(collector.classify(&seed(None)), Expansion::Bare);
    }

    #[tokio::test]
    async fn test_concurrency_caps_store_queries_across_groups() {
        let store = store().with_latency(std::time::Duration::from_millis(20));
        let config = RetrievalConfig {
            concurrency: 2,
            ..Default::default()
        };
        let collector = SubgraphCollector::new(&store, &config);
        let collector = &collector;
        let seed = |id: &'static str| EntitySeed {
            node: GraphNode::new(id, &["__Entity__"], Default::default()),
            similarity: Some(1.0),
        };

        // Two groups expanding at once, each with two traversals
        let (a, b) = tokio::join!(
            collector.expand_entities(vec![seed("e1"), seed("e3")]),
            collector.expand_entities(vec![seed("e2"), seed("e4")]),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(store.query_count(), 4);
        assert_eq!(store.peak_in_flight(), 2);
    }

    #[test]
    fn test_depth_is_clamped() {
        let store = store();
        let config = RetrievalConfig {
            traversal_depth: 50,
            ..Default::default()
        };
        let collector = SubgraphCollector::new(&store, &config);
        assert_eq!(collector.traversal().max_depth, MAX_TRAVERSAL_DEPTH);
    }
}
