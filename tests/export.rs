//! Graph exports and detail lookups over the in-memory fixture graph.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use kgrag::config::Config;
use kgrag::error::AppError;
use kgrag::models::{GraphExport, STRUCTURAL_TYPES};
use kgrag::services::GraphExporter;
use kgrag::store::MemoryStore;
use kgrag::FromRef;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{assert_distinct, context, context_with, store, store_from, strings};

fn exporter() -> GraphExporter {
    GraphExporter::from_ref(&context(store()))
}

fn node_ids(export: &GraphExport) -> BTreeSet<&str> {
    export.nodes.iter().map(|n| n.element_id.as_str()).collect()
}

fn relationship_ids(export: &GraphExport) -> BTreeSet<&str> {
    export
        .relationships
        .iter()
        .map(|r| r.relationship.element_id.as_str())
        .collect()
}

mod by_documents {
    use super::*;

    #[tokio::test]
    async fn test_full_export_has_each_element_once() {
        let export = exporter()
            .export_by_documents(
                &strings(&["doc1.pdf", "doc2.pdf"]),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_distinct(export.nodes.iter().map(|n| n.element_id.as_str()));
        assert_distinct(
            export
                .relationships
                .iter()
                .map(|r| r.relationship.element_id.as_str()),
        );
        // Ada and the Analytical Engine are mentioned by several chunks
        assert_eq!(export.nodes.iter().filter(|n| n.element_id == "e1").count(), 1);
        assert_eq!(export.nodes.iter().filter(|n| n.element_id == "e3").count(), 1);

        assert_eq!(export.nodes.len(), 15);
        assert_eq!(export.relationships.len(), 30);
        assert!(export.verify().is_ok());
    }

    #[tokio::test]
    async fn test_export_strips_heavy_properties() {
        let export = exporter()
            .export_by_documents(&strings(&["doc1.pdf"]), None, &CancellationToken::new())
            .await
            .unwrap();

        for node in &export.nodes {
            assert!(node.properties.get("embedding").is_none(), "{}", node.element_id);
            let is_chunk = node.labels.iter().any(|l| l == "Chunk");
            assert_eq!(node.properties.contains_key("text"), is_chunk, "{}", node.element_id);
        }
        let doc = export.nodes.iter().find(|n| n.element_id == "d1").unwrap();
        assert_eq!(doc.properties.get("fileName"), Some(&json!("doc1.pdf")));
    }

    #[tokio::test]
    async fn test_chunk_limit_closes_over_selected_chunks() {
        let export = exporter()
            .export_by_documents(
                &strings(&["doc1.pdf", "doc2.pdf"]),
                Some(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let nodes = node_ids(&export);
        assert_eq!(
            nodes,
            BTreeSet::from(["c1", "c3", "d1", "d2", "e1", "e3", "e5", "m1", "m3"])
        );
        // k1 -> k2 and k2 ~ k3 leave the selection; Babbage's edges leave with k2
        let rels = relationship_ids(&export);
        assert_eq!(
            rels,
            BTreeSet::from([
                "f1", "f2", "h1", "h2", "h6", "i1", "i3", "i5", "p1", "p3", "r1", "u1"
            ])
        );

        // Every extracted relationship joins two exported entities
        for rel in &export.relationships {
            if STRUCTURAL_TYPES.contains(&rel.relationship.rel_type.as_str()) {
                continue;
            }
            assert!(nodes.contains(rel.start_node.element_id.as_str()));
            assert!(nodes.contains(rel.end_node.element_id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_unknown_documents_are_skipped() {
        let exporter = exporter();
        let cancel = CancellationToken::new();

        let empty = exporter
            .export_by_documents(&strings(&["nope.pdf"]), None, &cancel)
            .await
            .unwrap();
        assert_eq!(empty, GraphExport::default());

        let partial = exporter
            .export_by_documents(&strings(&["doc2.pdf", "nope.pdf"]), None, &cancel)
            .await
            .unwrap();
        assert!(node_ids(&partial).contains("d2"));
        assert!(!node_ids(&partial).contains("d1"));
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let exporter = exporter();
        let cancel = CancellationToken::new();
        let names = strings(&["doc2.pdf", "doc1.pdf"]);

        let first = exporter.export_by_documents(&names, None, &cancel).await.unwrap();
        let second = exporter.export_by_documents(&names, None, &cancel).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_cyclic_community_chain_terminates() {
        let store = store_from(json!({
            "nodes": [
                {"element_id": "d1", "labels": ["Document"], "properties": {"fileName": "loop.pdf"}},
                {"element_id": "c1", "labels": ["Chunk"], "properties": {"id": "k1", "text": "t", "position": 1}},
                {"element_id": "e1", "labels": ["__Entity__", "Thing"], "properties": {"id": "a"}},
                {"element_id": "ma", "labels": ["__Community__"], "properties": {"id": "ma"}},
                {"element_id": "mb", "labels": ["__Community__"], "properties": {"id": "mb"}}
            ],
            "relationships": [
                {"element_id": "p1", "type": "PART_OF", "start": "c1", "end": "d1"},
                {"element_id": "h1", "type": "HAS_ENTITY", "start": "c1", "end": "e1"},
                {"element_id": "i1", "type": "IN_COMMUNITY", "start": "e1", "end": "ma"},
                {"element_id": "u1", "type": "PARENT_COMMUNITY", "start": "ma", "end": "mb"},
                {"element_id": "u2", "type": "PARENT_COMMUNITY", "start": "mb", "end": "ma"}
            ]
        }));
        let export = GraphExporter::from_ref(&context(store))
            .export_by_documents(&strings(&["loop.pdf"]), None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(node_ids(&export).is_superset(&BTreeSet::from(["ma", "mb"])));
        assert!(relationship_ids(&export).is_superset(&BTreeSet::from(["u1", "u2"])));
        assert_distinct(export.nodes.iter().map(|n| n.element_id.as_str()));
    }

    #[tokio::test]
    async fn test_slow_export_hits_deadline() {
        let store = std::sync::Arc::new(
            MemoryStore::from_json(common::FIXTURE)
                .unwrap()
                .with_latency(Duration::from_millis(500)),
        );
        let mut config = Config::default();
        config.retrieval.deadline_ms = 20;
        let err = GraphExporter::from_ref(&context_with(store, config))
            .export_by_documents(&strings(&["doc1.pdf"]), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeadlineExceeded(_)));
    }
}

mod by_ids {
    use super::*;

    #[tokio::test]
    async fn test_unresolved_ids_are_dropped() {
        let export = exporter()
            .export_by_ids(
                &strings(&["k2", "missing"]),
                &strings(&["e2", "zz"]),
                &strings(&["r2", "zz"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let document = export.document.as_ref().unwrap();
        assert_eq!(document.element_id, "d1");

        assert_eq!(export.chunks.len(), 1);
        let chunk = &export.chunks[0];
        assert_eq!(chunk.properties.get("id"), Some(&json!("k2")));
        assert!(chunk.properties.contains_key("text"));
        assert!(chunk.properties.get("embedding").is_none());

        let nodes: Vec<&str> = export.nodes.iter().map(|n| n.element_id.as_str()).collect();
        assert_eq!(nodes, vec!["e2", "e3"]);
        // Entity listings carry only id and description
        let keys: BTreeSet<&str> = export.nodes[0].properties.keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["description", "id"]));

        assert_eq!(export.relationships.len(), 1);
        let rel = &export.relationships[0];
        assert_eq!(rel.relationship.rel_type, "DESIGNED");
        assert_eq!(rel.start_node.properties.get("id"), Some(&json!("Charles Babbage")));
        assert_eq!(rel.end_node.properties.get("id"), Some(&json!("Analytical Engine")));
    }

    #[tokio::test]
    async fn test_nothing_resolves() {
        let export = exporter()
            .export_by_ids(&strings(&["x"]), &[], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(export.document.is_none());
        assert!(export.chunks.is_empty());
        assert!(export.nodes.is_empty());
    }
}

mod details {
    use super::*;

    #[tokio::test]
    async fn test_local_community_details() {
        let details = exporter()
            .local_community_details(&strings(&["e1", "zz"]), &CancellationToken::new())
            .await
            .unwrap();

        let chunks: Vec<&str> = details.chunks.iter().map(|c| c.element_id.as_str()).collect();
        assert_eq!(chunks, vec!["c1", "c4"]);
        assert_eq!(details.chunks[0].properties.get("fileName"), Some(&json!("doc1.pdf")));
        assert_eq!(details.chunks[0].properties.get("fileSource"), Some(&json!("web-url")));
        assert_eq!(details.chunks[1].properties.get("fileName"), Some(&json!("doc2.pdf")));

        let communities: Vec<&str> = details
            .communities
            .iter()
            .map(|c| c.element_id.as_str())
            .collect();
        assert_eq!(communities, vec!["m1", "m3"]);
        assert!(details
            .communities
            .iter()
            .all(|c| c.properties.get("embedding").is_none()));

        let nodes: Vec<&str> = details.nodes.iter().map(|n| n.element_id.as_str()).collect();
        assert_eq!(nodes, vec!["e1", "e3", "e6"]);
        let rels: Vec<&str> = details
            .relationships
            .iter()
            .map(|r| r.relationship.element_id.as_str())
            .collect();
        assert_eq!(rels, vec!["r1", "r5"]);
    }

    #[tokio::test]
    async fn test_global_community_details_only_returns_communities() {
        let details = exporter()
            .global_community_details(&strings(&["m2", "e1", "zz"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(details.communities.len(), 1);
        let community = &details.communities[0];
        assert_eq!(community.element_id, "m2");
        assert_eq!(community.properties.get("summary"), Some(&json!("Romantic poets.")));
        assert!(community.properties.get("embedding").is_none());
    }
}
