//! Typed graph records returned by the store, and the deduplicating
//! [`Subgraph`] accumulator built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Label carried by every extracted entity next to its domain label.
pub const ENTITY_LABEL: &str = "__Entity__";
/// Label of community nodes.
pub const COMMUNITY_LABEL: &str = "__Community__";
/// Label of chunk nodes.
pub const CHUNK_LABEL: &str = "Chunk";
/// Label of document nodes.
pub const DOCUMENT_LABEL: &str = "Document";

/// Chunk → entity mention.
pub const HAS_ENTITY: &str = "HAS_ENTITY";
/// Chunk → owning document.
pub const PART_OF: &str = "PART_OF";
/// First chunk → owning document.
pub const FIRST_CHUNK: &str = "FIRST_CHUNK";
/// Chunk → following chunk.
pub const NEXT_CHUNK: &str = "NEXT_CHUNK";
/// Chunk ↔ similar chunk.
pub const SIMILAR: &str = "SIMILAR";
/// Entity → community.
pub const IN_COMMUNITY: &str = "IN_COMMUNITY";
/// Community → parent community.
pub const PARENT_COMMUNITY: &str = "PARENT_COMMUNITY";

/// Relationship types that are part of the document/community scaffolding
/// rather than extracted knowledge.
pub const STRUCTURAL_TYPES: &[&str] = &[
    HAS_ENTITY,
    PART_OF,
    FIRST_CHUNK,
    NEXT_CHUNK,
    SIMILAR,
    IN_COMMUNITY,
    PARENT_COMMUNITY,
];

/// Properties that must never leave the crate: vectors are large and
/// meaningless to consumers.
pub const EMBEDDING_PROPERTY: &str = "embedding";
/// Raw text is heavy for every node except chunks.
pub const TEXT_PROPERTY: &str = "text";

/// Node property map.
pub type Properties = serde_json::Map<String, JsonValue>;

/// A node as returned by the store.
///
/// Identity is the store-assigned `element_id`; domain ids (`properties.id`)
/// may collide and are never used for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub element_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "non_null_properties")]
    pub properties: Properties,
}

/// Drops null-valued properties so "nulled" and "omitted" look the same.
fn non_null_properties<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    let props = Option::<Properties>::deserialize(deserializer)?.unwrap_or_default();
    Ok(props.into_iter().filter(|(_, v)| !v.is_null()).collect())
}

impl GraphNode {
    /// Creates a node with the given element id, labels, and properties.
    pub fn new(element_id: impl Into<String>, labels: &[&str], properties: Properties) -> Self {
        Self {
            element_id: element_id.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Returns a string property.
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(JsonValue::as_str)
    }

    /// Domain id (`id` property). Falls back to the element id when absent.
    pub fn id(&self) -> &str {
        self.str_prop("id").unwrap_or(&self.element_id)
    }

    pub fn description(&self) -> Option<&str> {
        self.str_prop("description").filter(|d| !d.is_empty())
    }

    /// Chunk ordering key within its document.
    pub fn position(&self) -> Option<i64> {
        self.properties.get("position").and_then(JsonValue::as_i64)
    }

    pub fn f64_prop(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(JsonValue::as_f64)
    }

    /// The embedding vector, if present and well formed.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.properties
            .get(EMBEDDING_PROPERTY)
            .and_then(JsonValue::as_array)
            .and_then(|values| {
                values
                    .iter()
                    .map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
    }

    /// The label used when rendering: the first label other than `__Entity__`,
    /// or an empty string for nodes that only carry the entity marker.
    pub fn display_label(&self) -> &str {
        self.labels
            .iter()
            .find(|l| l.as_str() != ENTITY_LABEL)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Concatenates the given text properties, skipping missing ones.
    pub fn text_of(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .filter_map(|f| match self.properties.get(*f) {
                Some(JsonValue::String(s)) => Some(s.clone()),
                Some(JsonValue::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns a copy without the embedding, and without raw text unless the
    /// node is a chunk.
    pub fn stripped(&self) -> GraphNode {
        let keep_text = self.has_label(CHUNK_LABEL);
        let properties = self
            .properties
            .iter()
            .filter(|(k, _)| {
                k.as_str() != EMBEDDING_PROPERTY && (keep_text || k.as_str() != TEXT_PROPERTY)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        GraphNode {
            element_id: self.element_id.clone(),
            labels: self.labels.clone(),
            properties,
        }
    }

    /// Returns a copy with only the embedding removed.
    pub fn without_embedding(mut self) -> GraphNode {
        self.properties.remove(EMBEDDING_PROPERTY);
        self
    }
}

/// A relationship as returned by the store. Identity is `element_id`;
/// parallel relationships of the same type are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub element_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Element id of the start node.
    pub start: String,
    /// Element id of the end node.
    pub end: String,
}

impl GraphRelationship {
    pub fn new(
        element_id: impl Into<String>,
        rel_type: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            rel_type: rel_type.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.start == node {
            Some(&self.end)
        } else if self.end == node {
            Some(&self.start)
        } else {
            None
        }
    }
}

/// A traversed path: `nodes.len() == relationships.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
}

impl GraphPath {
    /// A zero-length path made of a single node.
    pub fn single(node: GraphNode) -> Self {
        Self {
            nodes: vec![node],
            relationships: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// A relationship together with both endpoint nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub relationship: GraphRelationship,
    pub start: GraphNode,
    pub end: GraphNode,
}

/// Deduplicating accumulator of nodes and relationships.
///
/// Keys are element ids, so merging the same neighborhood reached from
/// several seeds stores it once. Iteration order is by element id, which
/// makes every listing derived from it independent of fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subgraph {
    nodes: BTreeMap<String, GraphNode>,
    relationships: BTreeMap<String, GraphRelationship>,
}

impl Subgraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node; the first copy seen wins.
    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.entry(node.element_id.clone()).or_insert(node);
    }

    pub fn add_relationship(&mut self, rel: GraphRelationship) {
        self.relationships
            .entry(rel.element_id.clone())
            .or_insert(rel);
    }

    /// Adds every node and relationship of a path.
    pub fn add_path(&mut self, path: GraphPath) {
        for node in path.nodes {
            self.add_node(node);
        }
        for rel in path.relationships {
            self.add_relationship(rel);
        }
    }

    /// Adds a relationship and both of its endpoints.
    pub fn add_record(&mut self, record: RelationshipRecord) {
        self.add_node(record.start);
        self.add_node(record.end);
        self.add_relationship(record.relationship);
    }

    pub fn merge(&mut self, other: Subgraph) {
        for (_, node) in other.nodes {
            self.add_node(node);
        }
        for (_, rel) in other.relationships {
            self.add_relationship(rel);
        }
    }

    pub fn contains_node(&self, element_id: &str) -> bool {
        self.nodes.contains_key(element_id)
    }

    pub fn node(&self, element_id: &str) -> Option<&GraphNode> {
        self.nodes.get(element_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &GraphRelationship> {
        self.relationships.values()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn relationship_ids(&self) -> Vec<String> {
        self.relationships.keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}
