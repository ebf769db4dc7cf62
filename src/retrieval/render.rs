//! Plain-text rendering of retrieved context.
//!
//! Node lines read `Label:id (description)`, relationship lines
//! `Label:id TYPE Label:id`. Listings are sorted so the text does not depend
//! on the order in which the store returned records.

use crate::models::{GraphNode, RelationshipRecord, Subgraph};

/// Separator between context blocks.
pub const DIVIDER: &str = "\n----\n";

pub fn node_line(node: &GraphNode) -> String {
    let mut line = format!("{}:{}", node.display_label(), node.id());
    if let Some(description) = node.description() {
        line.push_str(" (");
        line.push_str(description);
        line.push(')');
    }
    line
}

/// Endpoint missing from the subgraph: labelled by element id only.
fn endpoint(node: Option<&GraphNode>, element_id: &str) -> String {
    match node {
        Some(node) => format!("{}:{}", node.display_label(), node.id()),
        None => format!(":{}", element_id),
    }
}

pub fn relationship_line(start: &GraphNode, rel_type: &str, end: &GraphNode) -> String {
    format!(
        "{}:{} {} {}:{}",
        start.display_label(),
        start.id(),
        rel_type,
        end.display_label(),
        end.id()
    )
}

pub fn record_line(record: &RelationshipRecord) -> String {
    relationship_line(&record.start, &record.relationship.rel_type, &record.end)
}

fn sorted(mut lines: Vec<String>) -> Vec<String> {
    lines.sort();
    lines
}

pub fn node_lines<'a>(nodes: impl IntoIterator<Item = &'a GraphNode>) -> Vec<String> {
    sorted(nodes.into_iter().map(node_line).collect())
}

pub fn record_lines<'a>(records: impl IntoIterator<Item = &'a RelationshipRecord>) -> Vec<String> {
    sorted(records.into_iter().map(record_line).collect())
}

/// Relationship lines of a subgraph, endpoints resolved within it.
pub fn relationship_lines(graph: &Subgraph) -> Vec<String> {
    sorted(
        graph
            .relationships()
            .map(|rel| {
                format!(
                    "{} {} {}",
                    endpoint(graph.node(&rel.start), &rel.start),
                    rel.rel_type,
                    endpoint(graph.node(&rel.end), &rel.end)
                )
            })
            .collect(),
    )
}

/// A titled block: `Title:` followed by one line per entry.
pub fn section(title: &str, lines: &[String]) -> String {
    format!("{}:\n{}", title, lines.join("\n"))
}

/// Chunk texts followed by the entities and relationships around them.
pub fn chunk_graph_text(texts: &[String], graph: &Subgraph) -> String {
    [
        format!("Text Content:\n{}", texts.join(DIVIDER)),
        section("Entities", &node_lines(graph.nodes())),
        section("Relationships", &relationship_lines(graph)),
    ]
    .join(DIVIDER)
}
