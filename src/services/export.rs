//! Visualization exports: flattened, deduplicated, stripped subgraphs.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;
use crate::di::FromContext;
use crate::error::{AppError, Degradation};
use crate::models::{
    Document, ExportNode, ExportRelationship, GlobalCommunityDetails, GraphExport, GraphNode,
    IdExport, LocalCommunityDetails, Subgraph, COMMUNITY_LABEL,
};
use crate::retrieval::{CommunityWalker, LocalContext};
use crate::store::AppStore;

use super::run_bounded;

/// Reports requested ids that did not resolve.
fn report_missing<'a>(
    kind: &'static str,
    requested: &[String],
    found: impl IntoIterator<Item = &'a str>,
) {
    let found: BTreeSet<&str> = found.into_iter().collect();
    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !missing.is_empty() {
        Degradation::PartialData { kind, missing }.report();
    }
}

/// Builds graph exports by document names or explicit ids.
#[derive(FromContext, Clone)]
pub struct GraphExporter {
    store: AppStore,
    config: Arc<Config>,
}

impl GraphExporter {
    /// Exports the graph around the chunks of the named documents.
    ///
    /// Documents are taken newest first with up to `chunk_limit` chunks each
    /// (the configured default when `None`). Chunk links are kept only
    /// between selected chunks, and entity relationships only between
    /// entities of those chunks. Communities of the entities and their
    /// parent chains are included.
    #[tracing::instrument(skip(self, names, cancel), fields(documents = names.len()))]
    pub async fn export_by_documents(
        &self,
        names: &[String],
        chunk_limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<GraphExport, AppError> {
        let limit = chunk_limit.unwrap_or(self.config.export.chunk_limit);
        let export = run_bounded(
            self.config.retrieval.deadline(),
            cancel,
            self.collect_documents(names, limit),
        )
        .await?;

        tracing::info!(
            nodes = export.nodes.len(),
            relationships = export.relationships.len(),
            "Document export complete"
        );
        Ok(export)
    }

    async fn collect_documents(&self, names: &[String], limit: usize) -> Result<GraphExport, AppError> {
        let store = self.store.as_ref();
        let mut graph = Subgraph::new();

        let documents = store.documents_by_name(names).await?;
        report_missing(
            "document",
            names,
            documents.iter().filter_map(|d| d.str_prop("fileName")),
        );
        if documents.is_empty() {
            return Ok(GraphExport::default());
        }

        let per_document: Vec<_> = futures::stream::iter(
            documents
                .iter()
                .map(|doc| store.document_chunks(&doc.element_id, limit)),
        )
        .buffered(self.config.retrieval.concurrency.max(1))
        .try_collect()
        .await?;

        let mut chunk_ids: Vec<String> = Vec::new();
        for (document, links) in documents.iter().zip(per_document) {
            graph.add_node(document.clone());
            for link in links {
                if !graph.contains_node(&link.chunk.element_id) {
                    chunk_ids.push(link.chunk.element_id.clone());
                }
                graph.add_node(link.chunk);
                graph.add_relationship(link.relationship);
            }
        }

        let (chunk_links, mentions) = tokio::try_join!(
            store.chunk_links(&chunk_ids),
            store.chunk_entities(&chunk_ids)
        )?;
        for rel in chunk_links {
            graph.add_relationship(rel);
        }

        let mut entity_ids: Vec<String> = Vec::new();
        for mention in mentions {
            if !graph.contains_node(&mention.entity.element_id) {
                entity_ids.push(mention.entity.element_id.clone());
            }
            graph.add_node(mention.entity);
            graph.add_relationship(mention.relationship);
        }

        let walker = CommunityWalker::new(store, self.config.retrieval.community_depth_cap);
        let (among, closure) = tokio::try_join!(
            store.relationships_among(&entity_ids),
            walker.local_closure(&entity_ids)
        )?;
        for record in among {
            graph.add_record(record);
        }
        closure.add_to(&mut graph);

        tracing::debug!(
            documents = documents.len(),
            chunks = chunk_ids.len(),
            entities = entity_ids.len(),
            "Collected document graph"
        );

        let export = GraphExport::from_subgraph(&graph);
        export.verify()?;
        Ok(export)
    }

    /// Exports explicit chunks (by `Chunk.id`), entities, and relationships
    /// (by element id). Ids that do not resolve are omitted and logged.
    #[tracing::instrument(skip_all, fields(
        chunks = chunk_ids.len(),
        entities = entity_ids.len(),
        relationships = relationship_ids.len()
    ))]
    pub async fn export_by_ids(
        &self,
        chunk_ids: &[String],
        entity_ids: &[String],
        relationship_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<IdExport, AppError> {
        run_bounded(self.config.retrieval.deadline(), cancel, async {
            let store = self.store.as_ref();
            let (chunks, nodes, records) = tokio::try_join!(
                store.chunks_by_ids(chunk_ids),
                store.nodes_by_ids(entity_ids),
                store.relationships_by_ids(relationship_ids)
            )?;

            report_missing("chunk", chunk_ids, chunks.iter().map(|c| c.chunk.id()));
            report_missing("entity", entity_ids, nodes.iter().map(|n| n.element_id.as_str()));
            report_missing(
                "relationship",
                relationship_ids,
                records.iter().map(|r| r.relationship.element_id.as_str()),
            );

            let mut graph = Subgraph::new();
            for node in &nodes {
                graph.add_node(node.clone());
            }
            for record in &records {
                graph.add_record(record.clone());
            }

            let export = IdExport {
                document: chunks.first().map(|c| ExportNode::stripped(&c.document)),
                chunks: chunks.iter().map(|c| ExportNode::stripped(&c.chunk)).collect(),
                nodes: graph.nodes().map(ExportNode::summary).collect(),
                relationships: graph
                    .relationships()
                    .map(|r| ExportRelationship::from_subgraph(r, &graph))
                    .collect(),
            };
            export.verify()?;
            Ok::<_, AppError>(export)
        })
        .await
    }

    /// Hydrates entity-anchored context for display.
    #[tracing::instrument(skip(self, entity_ids, cancel), fields(entities = entity_ids.len()))]
    pub async fn local_community_details(
        &self,
        entity_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<LocalCommunityDetails, AppError> {
        run_bounded(self.config.retrieval.deadline(), cancel, async {
            let store = self.store.as_ref();
            let entities = store.nodes_by_ids(entity_ids).await?;
            report_missing(
                "entity",
                entity_ids,
                entities.iter().map(|n| n.element_id.as_str()),
            );

            let local = LocalContext::build(store, &self.config.retrieval, entities).await?;
            let chunk_ids: Vec<String> =
                local.chunks.iter().map(|c| c.element_id.clone()).collect();
            let owned = store.chunk_documents(&chunk_ids).await?;

            let chunks = local
                .chunks
                .iter()
                .map(|chunk| {
                    let mut node = ExportNode::stripped(chunk);
                    if let Some(owner) = owned.iter().find(|o| o.chunk.element_id == chunk.element_id) {
                        let document = Document::from_node(&owner.document);
                        node.properties
                            .insert("fileName".into(), JsonValue::String(document.file_name));
                        node.properties.insert(
                            "fileSource".into(),
                            document
                                .file_source
                                .map(JsonValue::String)
                                .unwrap_or(JsonValue::Null),
                        );
                    }
                    node
                })
                .collect();

            let graph = local.entity_graph();
            let details = LocalCommunityDetails {
                chunks,
                communities: local
                    .communities
                    .iter()
                    .chain(&local.parent_communities)
                    .map(ExportNode::stripped)
                    .collect(),
                nodes: graph.nodes().map(ExportNode::summary).collect(),
                relationships: graph
                    .relationships()
                    .map(|r| ExportRelationship::from_subgraph(r, &graph))
                    .collect(),
            };
            details.verify()?;
            Ok::<_, AppError>(details)
        })
        .await
    }

    /// Hydrates community-anchored context for display.
    #[tracing::instrument(skip(self, community_ids, cancel), fields(communities = community_ids.len()))]
    pub async fn global_community_details(
        &self,
        community_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<GlobalCommunityDetails, AppError> {
        run_bounded(self.config.retrieval.deadline(), cancel, async {
            let communities: Vec<GraphNode> = self
                .store
                .nodes_by_ids(community_ids)
                .await?
                .into_iter()
                .filter(|n| n.has_label(COMMUNITY_LABEL))
                .collect();
            report_missing(
                "community",
                community_ids,
                communities.iter().map(|n| n.element_id.as_str()),
            );

            let details = GlobalCommunityDetails {
                communities: communities.iter().map(ExportNode::stripped).collect(),
            };
            details.verify()?;
            Ok::<_, AppError>(details)
        })
        .await
    }
}
