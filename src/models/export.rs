//! Export payload shapes consumed by visualization clients.
//!
//! Node shape: `{element_id, labels, properties}`.
//! Relationship shape: `{startNode, endNode, relationship: {type, element_id}}`.
//!
//! Every payload is checked with [`verify`](GraphExport::verify) before it
//! leaves the crate; a surviving heavy field fails the call.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::graph::{
    GraphNode, GraphRelationship, Properties, Subgraph, CHUNK_LABEL, EMBEDDING_PROPERTY,
    TEXT_PROPERTY,
};
use crate::error::AppError;

/// A node in an export payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNode {
    pub element_id: String,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl ExportNode {
    /// Only `id` and `description`: the stable shape for entity listings.
    pub fn summary(node: &GraphNode) -> Self {
        let mut properties = Properties::new();
        properties.insert("id".into(), JsonValue::String(node.id().to_string()));
        properties.insert(
            "description".into(),
            node.description()
                .map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null),
        );
        Self {
            element_id: node.element_id.clone(),
            labels: node.labels.clone(),
            properties,
        }
    }

    /// All properties except heavy fields.
    pub fn stripped(node: &GraphNode) -> Self {
        let node = node.stripped();
        Self {
            element_id: node.element_id,
            labels: node.labels,
            properties: node.properties,
        }
    }

    /// Placeholder for an endpoint that was not part of the fetched payload.
    fn reference(element_id: &str) -> Self {
        Self {
            element_id: element_id.to_string(),
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    fn check(&self) -> Result<(), AppError> {
        let leaked = |field: &str| {
            self.properties
                .get(field)
                .map(|v| !v.is_null())
                .unwrap_or(false)
        };
        let is_chunk = self.labels.iter().any(|l| l == CHUNK_LABEL);

        if leaked(EMBEDDING_PROPERTY) {
            return Err(AppError::ContractViolation {
                element_id: self.element_id.clone(),
                field: EMBEDDING_PROPERTY.to_string(),
            });
        }
        if !is_chunk && leaked(TEXT_PROPERTY) {
            return Err(AppError::ContractViolation {
                element_id: self.element_id.clone(),
                field: TEXT_PROPERTY.to_string(),
            });
        }
        Ok(())
    }
}

/// Relationship identity and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRef {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub element_id: String,
}

/// A relationship with its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRelationship {
    #[serde(rename = "startNode")]
    pub start_node: ExportNode,
    #[serde(rename = "endNode")]
    pub end_node: ExportNode,
    pub relationship: RelationshipRef,
}

impl ExportRelationship {
    /// Builds the payload, resolving endpoints from `graph` as summaries.
    pub fn from_subgraph(rel: &GraphRelationship, graph: &Subgraph) -> Self {
        let endpoint = |id: &str| {
            graph
                .node(id)
                .map(ExportNode::summary)
                .unwrap_or_else(|| ExportNode::reference(id))
        };
        Self {
            start_node: endpoint(&rel.start),
            end_node: endpoint(&rel.end),
            relationship: RelationshipRef {
                rel_type: rel.rel_type.clone(),
                element_id: rel.element_id.clone(),
            },
        }
    }

    fn check(&self) -> Result<(), AppError> {
        self.start_node.check()?;
        self.end_node.check()
    }
}

fn check_all<'a>(
    nodes: impl IntoIterator<Item = &'a ExportNode>,
    rels: impl IntoIterator<Item = &'a ExportRelationship>,
) -> Result<(), AppError> {
    for node in nodes {
        node.check()?;
    }
    for rel in rels {
        rel.check()?;
    }
    Ok(())
}

/// Flattened, deduplicated subgraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub relationships: Vec<ExportRelationship>,
}

impl GraphExport {
    /// Shapes a subgraph with fully stripped node properties.
    pub fn from_subgraph(graph: &Subgraph) -> Self {
        Self {
            nodes: graph.nodes().map(ExportNode::stripped).collect(),
            relationships: graph
                .relationships()
                .map(|r| ExportRelationship::from_subgraph(r, graph))
                .collect(),
        }
    }

    pub fn verify(&self) -> Result<(), AppError> {
        check_all(&self.nodes, &self.relationships)
    }
}

/// Result of an export by explicit ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdExport {
    /// Owning document of the requested chunks.
    pub document: Option<ExportNode>,
    pub chunks: Vec<ExportNode>,
    pub nodes: Vec<ExportNode>,
    pub relationships: Vec<ExportRelationship>,
}

impl IdExport {
    pub fn verify(&self) -> Result<(), AppError> {
        check_all(
            self.document.iter().chain(&self.chunks).chain(&self.nodes),
            &self.relationships,
        )
    }
}

/// Hydration payload for entity-anchored (local community) context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalCommunityDetails {
    /// Chunks with their owning document's `fileName` and `fileSource`.
    pub chunks: Vec<ExportNode>,
    pub communities: Vec<ExportNode>,
    pub nodes: Vec<ExportNode>,
    pub relationships: Vec<ExportRelationship>,
}

impl LocalCommunityDetails {
    pub fn verify(&self) -> Result<(), AppError> {
        check_all(
            self.chunks
                .iter()
                .chain(&self.communities)
                .chain(&self.nodes),
            &self.relationships,
        )
    }
}

/// Hydration payload for community-anchored (global) context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalCommunityDetails {
    pub communities: Vec<ExportNode>,
}

impl GlobalCommunityDetails {
    pub fn verify(&self) -> Result<(), AppError> {
        check_all(&self.communities, std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, labels: &[&str], props: JsonValue) -> GraphNode {
        GraphNode::new(id, labels, props.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_summary_shape() {
        let n = node(
            "4:x:1",
            &["__Entity__", "Person"],
            json!({"id": "Ada", "description": "mathematician", "embedding": [0.1]}),
        );
        let value = serde_json::to_value(ExportNode::summary(&n)).unwrap();
        assert_eq!(
            value,
            json!({
                "element_id": "4:x:1",
                "labels": ["__Entity__", "Person"],
                "properties": {"id": "Ada", "description": "mathematician"}
            })
        );
    }

    #[test]
    fn test_relationship_shape_uses_camel_case_endpoints() {
        let mut graph = Subgraph::new();
        graph.add_node(node("a", &["__Entity__", "Person"], json!({"id": "Ada"})));
        graph.add_node(node("b", &["__Entity__", "Machine"], json!({"id": "Engine"})));
        let rel = GraphRelationship::new("r1", "DESIGNED", "a", "b");
        let value = serde_json::to_value(ExportRelationship::from_subgraph(&rel, &graph)).unwrap();
        assert_eq!(value["startNode"]["properties"]["id"], "Ada");
        assert_eq!(value["endNode"]["properties"]["id"], "Engine");
        assert_eq!(value["relationship"], json!({"type": "DESIGNED", "element_id": "r1"}));
    }

    #[test]
    fn test_verify_rejects_leaked_embedding() {
        let export = GraphExport {
            nodes: vec![ExportNode {
                element_id: "e1".into(),
                labels: vec!["__Entity__".into()],
                properties: json!({"embedding": [0.3]}).as_object().cloned().unwrap(),
            }],
            relationships: Vec::new(),
        };
        assert!(matches!(
            export.verify(),
            Err(AppError::ContractViolation { field, .. }) if field == "embedding"
        ));
    }

    #[test]
    fn test_verify_allows_chunk_text_but_not_entity_text() {
        let chunk = ExportNode {
            element_id: "c1".into(),
            labels: vec!["Chunk".into()],
            properties: json!({"text": "body"}).as_object().cloned().unwrap(),
        };
        let entity = ExportNode {
            element_id: "e1".into(),
            labels: vec!["__Entity__".into()],
            properties: json!({"text": "body"}).as_object().cloned().unwrap(),
        };
        let ok = IdExport {
            chunks: vec![chunk],
            ..Default::default()
        };
        assert!(ok.verify().is_ok());
        let bad = IdExport {
            nodes: vec![entity],
            ..Default::default()
        };
        assert!(bad.verify().is_err());
    }

    #[test]
    fn test_from_subgraph_strips_every_node() {
        let mut graph = Subgraph::new();
        graph.add_node(node(
            "d1",
            &["Document"],
            json!({"fileName": "doc1.pdf", "embedding": [1.0]}),
        ));
        let export = GraphExport::from_subgraph(&graph);
        assert!(export.verify().is_ok());
        assert_eq!(export.nodes[0].properties.get("fileName"), Some(&json!("doc1.pdf")));
    }
}
