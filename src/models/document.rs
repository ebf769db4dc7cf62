//! Document-level views over graph nodes.

use serde::{Deserialize, Serialize};

use super::graph::GraphNode;

/// Marker some ingestion paths write into `url` when no URL exists.
const MISSING_URL_SENTINEL: &str = "None";

/// A source document, read from a `Document` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub element_id: String,
    pub file_name: String,
    pub url: Option<String>,
    pub file_source: Option<String>,
    pub created_at: Option<String>,
}

impl Document {
    /// Reads the document attributes from a `Document` node.
    pub fn from_node(node: &GraphNode) -> Self {
        Self {
            element_id: node.element_id.clone(),
            file_name: node.str_prop("fileName").unwrap_or_default().to_string(),
            url: node.str_prop("url").map(str::to_string),
            file_source: node.str_prop("fileSource").map(str::to_string),
            created_at: node.str_prop("createdAt").map(str::to_string),
        }
    }

    /// The identifier shown to callers as the provenance of a context item:
    /// the URL when it is usable, otherwise the file name.
    pub fn source(&self) -> String {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() && !url.contains(MISSING_URL_SENTINEL) => url.to_string(),
            _ => self.file_name.clone(),
        }
    }
}

/// One page of chunk text, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkText {
    pub text: String,
    pub position: i64,
    #[serde(default)]
    pub page_number: Option<i64>,
}

/// Size of the knowledge extracted from one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    /// Distinct entities mentioned by the document's chunks.
    pub nodes: usize,
    /// Distinct entity–entity relationships among those entities.
    pub rels: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(url: Option<&str>) -> Document {
        let mut props = json!({"fileName": "doc1.pdf"});
        if let Some(url) = url {
            props["url"] = json!(url);
        }
        Document::from_node(&GraphNode::new(
            "d1",
            &["Document"],
            props.as_object().cloned().unwrap_or_default(),
        ))
    }

    #[test]
    fn test_source_prefers_url() {
        assert_eq!(doc(Some("https://example.org/a")).source(), "https://example.org/a");
    }

    #[test]
    fn test_source_falls_back_to_file_name() {
        assert_eq!(doc(None).source(), "doc1.pdf");
        assert_eq!(doc(Some("")).source(), "doc1.pdf");
        assert_eq!(doc(Some("None")).source(), "doc1.pdf");
        assert_eq!(doc(Some("s3://bucket/None")).source(), "doc1.pdf");
    }
}
