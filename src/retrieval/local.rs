//! Entity-anchored context: the chunks, communities, and neighbors around a
//! set of entity hits.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::config::RetrievalConfig;
use crate::error::AppError;
use crate::models::{GraphNode, RelationshipRecord, Subgraph};
use crate::store::GraphStore;

use super::community::CommunityWalker;
use super::render::{node_lines, record_lines, section, DIVIDER};

/// Everything gathered around a set of anchor entities.
#[derive(Debug, Clone, Default)]
pub struct LocalContext {
    /// The anchor entities, in hit order.
    pub entities: Vec<GraphNode>,
    /// Chunks mentioning the most anchors.
    pub chunks: Vec<GraphNode>,
    /// Best ranked communities of the anchors.
    pub communities: Vec<GraphNode>,
    /// Ancestors of `communities` not already among them.
    pub parent_communities: Vec<GraphNode>,
    /// Relationships between anchors.
    pub relationships: Vec<RelationshipRecord>,
    /// Most connected entities outside the anchor set.
    pub outside_nodes: Vec<GraphNode>,
    /// Relationships linking anchors to `outside_nodes`.
    pub outside_relationships: Vec<RelationshipRecord>,
}

/// Community order: `community_rank` ascending, then `weight` descending.
/// Missing values sort last; remaining ties by element id.
fn community_order(a: &GraphNode, b: &GraphNode) -> Ordering {
    fn rank(n: &GraphNode) -> f64 {
        n.f64_prop("community_rank").unwrap_or(f64::INFINITY)
    }
    fn weight(n: &GraphNode) -> f64 {
        n.f64_prop("weight").unwrap_or(f64::NEG_INFINITY)
    }
    rank(a)
        .total_cmp(&rank(b))
        .then_with(|| weight(b).total_cmp(&weight(a)))
        .then_with(|| a.element_id.cmp(&b.element_id))
}

/// Ranks candidates by how many distinct anchors they touch, most first,
/// ties by element id.
fn by_frequency(mut counted: Vec<(GraphNode, usize)>, limit: usize) -> Vec<GraphNode> {
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.element_id.cmp(&b.0.element_id)));
    counted.into_iter().take(limit).map(|(n, _)| n).collect()
}

impl LocalContext {
    /// Gathers the context around `entities`. Independent lookups run
    /// concurrently.
    #[tracing::instrument(skip_all, fields(entities = entities.len()))]
    pub async fn build(
        store: &dyn GraphStore,
        config: &RetrievalConfig,
        entities: Vec<GraphNode>,
    ) -> Result<Self, AppError> {
        if entities.is_empty() {
            return Ok(Self::default());
        }
        let ids: Vec<String> = entities.iter().map(|e| e.element_id.clone()).collect();

        let chunks = async {
            let mentions = store.entity_chunks(&ids).await?;
            let mut counts: BTreeMap<String, (GraphNode, Vec<String>)> = BTreeMap::new();
            for mention in mentions {
                let entry = counts
                    .entry(mention.chunk.element_id.clone())
                    .or_insert_with(|| (mention.chunk, Vec::new()));
                if !entry.1.contains(&mention.entity.element_id) {
                    entry.1.push(mention.entity.element_id);
                }
            }
            let counted = counts
                .into_values()
                .map(|(chunk, anchors)| (chunk, anchors.len()))
                .collect();
            Ok::<_, AppError>(by_frequency(counted, config.local_top_chunks))
        };

        let communities = async {
            let walker = CommunityWalker::new(store, config.community_depth_cap);
            let memberships = store.community_memberships(&ids).await?;
            let mut top: Vec<GraphNode> = Vec::new();
            for link in memberships {
                if !top.iter().any(|c| c.element_id == link.community.element_id) {
                    top.push(link.community);
                }
            }
            top.sort_by(community_order);
            top.truncate(config.local_top_communities);

            let top_ids: Vec<String> = top.iter().map(|c| c.element_id.clone()).collect();
            let mut parents: Vec<GraphNode> = Vec::new();
            for link in walker.walk_parents(&top_ids).await? {
                let id = &link.community.element_id;
                if !top_ids.contains(id) && !parents.iter().any(|p| &p.element_id == id) {
                    parents.push(link.community);
                }
            }
            Ok::<_, AppError>((top, parents))
        };

        let outside = async {
            let records = store.entity_neighbors(&ids).await?;
            // outside node element id -> (node, relationships to anchors)
            let mut by_node: HashMap<String, (GraphNode, Vec<RelationshipRecord>)> =
                HashMap::new();
            for record in records {
                let outside = if ids.contains(&record.start.element_id) {
                    record.end.clone()
                } else {
                    record.start.clone()
                };
                by_node
                    .entry(outside.element_id.clone())
                    .or_insert_with(|| (outside, Vec::new()))
                    .1
                    .push(record);
            }
            let mut rels_of: HashMap<String, Vec<RelationshipRecord>> = HashMap::new();
            let counted = by_node
                .into_values()
                .map(|(node, rels)| {
                    let n = rels.len();
                    rels_of.insert(node.element_id.clone(), rels);
                    (node, n)
                })
                .collect();
            let nodes = by_frequency(counted, config.local_top_outside_rels);
            let rels: Vec<RelationshipRecord> = nodes
                .iter()
                .flat_map(|n| rels_of.remove(&n.element_id).unwrap_or_default())
                .collect();
            Ok::<_, AppError>((nodes, rels))
        };

        let (chunks, (communities, parent_communities), relationships, (outside_nodes, outside_relationships)) = tokio::try_join!(
            chunks,
            communities,
            store.relationships_among(&ids),
            outside
        )?;

        tracing::debug!(
            chunks = chunks.len(),
            communities = communities.len(),
            parents = parent_communities.len(),
            relationships = relationships.len(),
            outside = outside_nodes.len(),
            "Built local context"
        );

        Ok(Self {
            entities,
            chunks,
            communities,
            parent_communities,
            relationships,
            outside_nodes,
            outside_relationships,
        })
    }

    /// Anchors, outside neighbors, and every relationship among them.
    /// Communities and chunks are not part of it.
    pub fn entity_graph(&self) -> Subgraph {
        let mut graph = Subgraph::new();
        for node in self.entities.iter().chain(&self.outside_nodes) {
            graph.add_node(node.clone());
        }
        for record in self.relationships.iter().chain(&self.outside_relationships) {
            graph.add_record(record.clone());
        }
        graph
    }

    pub fn text(&self) -> String {
        let chunks: Vec<String> = self
            .chunks
            .iter()
            .filter_map(|c| c.str_prop("text"))
            .map(str::to_string)
            .collect();
        let summaries: Vec<String> = self
            .communities
            .iter()
            .chain(&self.parent_communities)
            .filter_map(|c| c.str_prop("summary"))
            .map(str::to_string)
            .collect();

        let mut outside = node_lines(&self.outside_nodes);
        outside.extend(record_lines(&self.outside_relationships));

        [
            format!("Chunks:\n{}", chunks.join(DIVIDER)),
            section("Communities", &summaries),
            section("Entities", &node_lines(&self.entities)),
            section("Relationships", &record_lines(&self.relationships)),
            section("Outside", &outside),
        ]
        .join(DIVIDER)
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
                    {"element_id": "c1", "labels": ["Chunk"], "properties": {"id": "k1", "text": "both anchors"}},
                    {"element_id": "c2", "labels": ["Chunk"], "properties": {"id": "k2", "text": "one anchor"}},
                    {"element_id": "e1", "labels": ["__Entity__", "Person"], "properties": {"id": "Ada", "description": "mathematician"}},
                    {"element_id": "e2", "labels": ["__Entity__", "Person"], "properties": {"id": "Babbage"}},
                    {"element_id": "e3", "labels": ["__Entity__", "Place"], "properties": {"id": "London"}},
                    {"element_id": "e4", "labels": ["__Entity__", "Machine"], "properties": {"id": "Engine"}},
                    {"element_id": "m1", "labels": ["__Community__"], "properties": {"id": "m1", "summary": "low rank", "community_rank": 2, "weight": 5}},
                    {"element_id": "m2", "labels": ["__Community__"], "properties": {"id": "m2", "summary": "top rank", "community_rank": 1, "weight": 1}},
                    {"element_id": "m3", "labels": ["__Community__"], "properties": {"id": "m3", "summary": "parent", "community_rank": 9}}
                ],
                "relationships": [
                    {"element_id": "h1", "type": "HAS_ENTITY", "start": "c1", "end": "e1"},
                    {"element_id": "h2", "type": "HAS_ENTITY", "start": "c1", "end": "e2"},
                    {"element_id": "h3", "type": "HAS_ENTITY", "start": "c2", "end": "e1"},
                    {"element_id": "r1", "type": "WORKED_WITH", "start": "e1", "end": "e2"},
                    {"element_id": "r2", "type": "LIVED_IN", "start": "e1", "end": "e3"},
                    {"element_id": "r3", "type": "LIVED_IN", "start": "e2", "end": "e3"},
                    {"element_id": "r4", "type": "DESIGNED", "start": "e2", "end": "e4"},
                    {"element_id": "i1", "type": "IN_COMMUNITY", "start": "e1", "end": "m1"},
                    {"element_id": "i2", "type": "IN_COMMUNITY", "start": "e2", "end": "m2"},
                    {"element_id": "p1", "type": "PARENT_COMMUNITY", "start": "m2", "end": "m3"}
                ]
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn anchors() -> Vec<GraphNode> {
        let e = |id: &str, label: &str, name: &str| {
            GraphNode::new(id, &["__Entity__", label], json!({"id": name}).as_object().cloned().unwrap())
        };
        vec![e("e1", "Person", "Ada"), e("e2", "Person", "Babbage")]
    }

    fn ids(nodes: &[GraphNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.element_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_local_context_rankings() {
        let store = store();
        let config = RetrievalConfig::default();
        let local = LocalContext::build(&store, &config, anchors()).await.unwrap();

        // c1 mentions both anchors
        assert_eq!(ids(&local.chunks), vec!["c1", "c2"]);
        assert_eq!(ids(&local.communities), vec!["m2", "m1"]);
        assert_eq!(ids(&local.parent_communities), vec!["m3"]);
        assert_eq!(local.relationships.len(), 1);
        // London touches both anchors, Engine one
        assert_eq!(ids(&local.outside_nodes), vec!["e3", "e4"]);
        assert_eq!(local.outside_relationships.len(), 3);
    }

    #[tokio::test]
    async fn test_local_context_limits() {
        let store = store();
        let config = RetrievalConfig {
            local_top_chunks: 1,
            local_top_communities: 1,
            local_top_outside_rels: 1,
            ..Default::default()
        };
        let local = LocalContext::build(&store, &config, anchors()).await.unwrap();
        assert_eq!(ids(&local.chunks), vec!["c1"]);
        assert_eq!(ids(&local.communities), vec!["m2"]);
        assert_eq!(ids(&local.outside_nodes), vec!["e3"]);
    }

    #[tokio::test]
    async fn test_local_text_sections() {
        let store = store();
        let config = RetrievalConfig::default();
        let local = LocalContext::build(&store, &config, anchors()).await.unwrap();
        let text = local.text();

        let sections: Vec<&str> = text.split(DIVIDER).collect();
        assert_eq!(sections[0], "Chunks:\nboth anchors");
        assert_eq!(sections[1], "one anchor");
        assert_eq!(sections[2], "Communities:\ntop rank\nlow rank\nparent");
        assert_eq!(sections[3], "Entities:\nPerson:Ada\nPerson:Babbage");
        assert_eq!(sections[4], "Relationships:\nPerson:Ada WORKED_WITH Person:Babbage");
        assert!(sections[5].starts_with("Outside:\nMachine:Engine\nPlace:London\n"));
    }

    #[tokio::test]
    async fn test_no_anchors_no_queries() {
        let store = store();
        let local = LocalContext::build(&store, &RetrievalConfig::default(), Vec::new())
            .await
            .unwrap();
        assert!(local.entity_graph().is_empty());
        assert_eq!(store.query_count(), 0);
    }
}
