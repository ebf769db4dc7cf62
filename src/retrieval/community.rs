//! Community membership and hierarchy walks.

use std::collections::BTreeSet;

use crate::error::{AppError, Degradation};
use crate::models::{GraphNode, Subgraph};
use crate::store::{CommunityLink, GraphStore, Hit};

use super::aggregate::{GroupBy, RankedGroup, ScoreAggregator};

/// Communities reachable from a set of entities.
#[derive(Debug, Clone, Default)]
pub struct CommunityClosure {
    /// Entity → community links.
    pub memberships: Vec<CommunityLink>,
    /// Child → parent links, level by level.
    pub parents: Vec<CommunityLink>,
}

fn distinct_communities<'a>(links: impl IntoIterator<Item = &'a CommunityLink>) -> Vec<&'a GraphNode> {
    let mut seen = BTreeSet::new();
    links
        .into_iter()
        .filter(|l| seen.insert(l.community.element_id.as_str()))
        .map(|l| &l.community)
        .collect()
}

impl CommunityClosure {
    /// Immediate communities, each once, in link order.
    pub fn communities(&self) -> Vec<&GraphNode> {
        distinct_communities(&self.memberships)
    }

    /// Ancestor communities not already among the immediate ones.
    pub fn parent_communities(&self) -> Vec<&GraphNode> {
        let immediate: BTreeSet<&str> = self
            .memberships
            .iter()
            .map(|l| l.community.element_id.as_str())
            .collect();
        distinct_communities(&self.parents)
            .into_iter()
            .filter(|c| !immediate.contains(c.element_id.as_str()))
            .collect()
    }

    /// Adds every community and link. Link sources must already be present
    /// for the relationships to have both endpoints.
    pub fn add_to(&self, graph: &mut Subgraph) {
        for link in self.memberships.iter().chain(&self.parents) {
            graph.add_node(link.community.clone());
            graph.add_relationship(link.relationship.clone());
        }
    }
}

/// Walks community memberships and parent chains.
pub struct CommunityWalker<'a> {
    store: &'a dyn GraphStore,
    depth_cap: usize,
}

impl<'a> CommunityWalker<'a> {
    pub fn new(store: &'a dyn GraphStore, depth_cap: usize) -> Self {
        Self { store, depth_cap }
    }

    /// Immediate memberships plus every ancestor of those communities.
    #[tracing::instrument(skip(self, entity_ids), fields(entities = entity_ids.len()))]
    pub async fn local_closure(&self, entity_ids: &[String]) -> Result<CommunityClosure, AppError> {
        if entity_ids.is_empty() {
            return Ok(CommunityClosure::default());
        }
        let memberships = self.store.community_memberships(entity_ids).await?;
        let start: Vec<String> = distinct_communities(&memberships)
            .into_iter()
            .map(|c| c.element_id.clone())
            .collect();
        let parents = self.walk_parents(&start).await?;
        Ok(CommunityClosure {
            memberships,
            parents,
        })
    }

    /// Parent links reachable from `communities`, walked one level per store
    /// query. Stops at the depth cap or when a level only revisits known
    /// communities; either way the links gathered so far are returned.
    pub async fn walk_parents(&self, communities: &[String]) -> Result<Vec<CommunityLink>, AppError> {
        let mut visited: BTreeSet<String> = communities.iter().cloned().collect();
        let mut frontier: Vec<String> = visited.iter().cloned().collect();
        let mut links = Vec::new();
        let mut level = 0;

        while !frontier.is_empty() {
            if level == self.depth_cap {
                Degradation::TraversalDepthExceeded {
                    walk: "community parents",
                    cap: self.depth_cap,
                }
                .report();
                break;
            }

            let found = self.store.parent_communities(&frontier).await?;
            let mut next = BTreeSet::new();
            for link in found {
                let id = link.community.element_id.clone();
                if visited.contains(&id) {
                    if !next.contains(&id) {
                        Degradation::CycleDetected {
                            walk: "community parents",
                            at: id,
                        }
                        .report();
                    }
                } else {
                    next.insert(id);
                }
                links.push(link);
            }

            visited.extend(next.iter().cloned());
            frontier = next.into_iter().collect();
            level += 1;
        }

        tracing::debug!(levels = level, links = links.len(), "Walked community parents");
        Ok(links)
    }

    /// Community-anchored search: each hit is its own group, ranked and
    /// averaged like any other mode. No further expansion.
    pub fn global_search(&self, hits: Vec<Hit>, aggregator: &ScoreAggregator) -> Vec<RankedGroup> {
        aggregator.aggregate(hits, GroupBy::SelfGrouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn community(id: &str, rank: i64) -> serde_json::Value {
        json!({"element_id": id, "labels": ["__Community__"], "properties": {"id": id, "summary": format!("summary {id}"), "community_rank": rank}})
    }

    fn store(cyclic: bool) -> MemoryStore {
        let mut rels = vec![
            json!({"element_id": "i1", "type": "IN_COMMUNITY", "start": "e1", "end": "m1"}),
            json!({"element_id": "i2", "type": "IN_COMMUNITY", "start": "e2", "end": "m1"}),
            json!({"element_id": "p1", "type": "PARENT_COMMUNITY", "start": "m1", "end": "m2"}),
            json!({"element_id": "p2", "type": "PARENT_COMMUNITY", "start": "m2", "end": "m3"}),
        ];
        if cyclic {
            rels.push(json!({"element_id": "p3", "type": "PARENT_COMMUNITY", "start": "m3", "end": "m1"}));
        }
        MemoryStore::new(
            serde_json::from_value(json!({
                "nodes": [
                    {"element_id": "e1", "labels": ["__Entity__"], "properties": {"id": "a"}},
                    {"element_id": "e2", "labels": ["__Entity__"], "properties": {"id": "b"}},
                    community("m1", 1),
                    community("m2", 2),
                    community("m3", 3)
                ],
                "relationships": rels
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn ids(nodes: Vec<&GraphNode>) -> Vec<&str> {
        nodes.into_iter().map(|n| n.element_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_local_closure_walks_parent_chain() {
        let store = store(false);
        let walker = CommunityWalker::new(&store, 10);
        let closure = walker
            .local_closure(&["e1".to_string(), "e2".to_string()])
            .await
            .unwrap();

        assert_eq!(ids(closure.communities()), vec!["m1"]);
        assert_eq!(ids(closure.parent_communities()), vec!["m2", "m3"]);
        assert_eq!(closure.memberships.len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_terminates_with_partial_closure() {
        let store = store(true);
        let walker = CommunityWalker::new(&store, 10);
        let closure = walker.local_closure(&["e1".to_string()]).await.unwrap();

        assert_eq!(ids(closure.parent_communities()), vec!["m2", "m3"]);
        // m1 -> m2, m2 -> m3, m3 -> m1 all recorded, the walk stopped at m1
        assert_eq!(closure.parents.len(), 3);
        // one membership query plus three parent levels
        assert_eq!(store.query_count(), 4);
    }

    #[tokio::test]
    async fn test_depth_cap_truncates() {
        let store = store(true);
        let walker = CommunityWalker::new(&store, 1);
        let closure = walker.local_closure(&["e1".to_string()]).await.unwrap();
        assert_eq!(ids(closure.parent_communities()), vec!["m2"]);
    }

    #[tokio::test]
    async fn test_closure_in_subgraph_has_no_duplicates() {
        let store = store(true);
        let walker = CommunityWalker::new(&store, 10);
        let closure = walker
            .local_closure(&["e1".to_string(), "e2".to_string()])
            .await
            .unwrap();
        let mut graph = Subgraph::new();
        closure.add_to(&mut graph);
        assert_eq!(graph.node_ids(), vec!["m1", "m2", "m3"]);
        assert_eq!(graph.relationship_ids(), vec!["i1", "i2", "p1", "p2", "p3"]);
    }
}
