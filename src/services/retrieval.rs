//! Context assembly: mode lookup, search, aggregation, expansion, rendering.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{
    Document, EntityIds, GraphNode, ItemScore, RetrievalMetadata, RetrievalRequest,
    RetrievalResult, SourceDetails, Subgraph,
};
use crate::retrieval::render::{chunk_graph_text, node_lines, relationship_lines, section, DIVIDER};
use crate::retrieval::{
    cosine_similarity, mean, merge_hybrid, CommunityWalker, EntitySeed, GroupBy, LocalContext,
    ModeConfig, ModeRegistry, RankedGroup, RetrievalStrategy, ScoreAggregator, SubgraphCollector,
};
use crate::store::{AppStore, Hit, KeywordSearch, VectorSearch};

use super::run_bounded;

/// Text and graph produced by one strategy.
struct Assembled {
    text: String,
    graph: Subgraph,
}

/// Produces `(text, score, metadata)` for a query in a given mode.
#[derive(FromContext, Clone)]
pub struct ContextAssembler {
    store: AppStore,
    config: Arc<Config>,
    modes: Arc<ModeRegistry>,
}

impl ContextAssembler {
    /// Retrieves context for a request.
    ///
    /// The mode is resolved before anything touches the store, so an unknown
    /// mode never costs a query. No hits is not an error: the result is
    /// empty.
    #[tracing::instrument(skip(self, request, cancel), fields(mode = %request.mode))]
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult, AppError> {
        let mode = self.modes.lookup(&request.mode)?;
        let has_keyword = mode.keyword_index.is_some()
            && request
                .keyword
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false);
        if request.embedding.is_empty() && !has_keyword {
            return Err(AppError::Validation(format!(
                "mode {} needs a query embedding",
                mode.id
            )));
        }

        let result = run_bounded(
            self.config.retrieval.deadline(),
            cancel,
            self.assemble(mode, request),
        )
        .await?;

        tracing::info!(
            mode = mode.id,
            sources = result.metadata.sources.len(),
            length = result.metadata.length,
            "Retrieval complete"
        );
        Ok(result)
    }

    async fn assemble(
        &self,
        mode: &ModeConfig,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResult, AppError> {
        let hits = self.search(mode, request).await?;
        if hits.is_empty() {
            tracing::debug!(mode = mode.id, "No hits");
            return Ok(RetrievalResult::empty(mode.id));
        }
        tracing::debug!(mode = mode.id, hits = hits.len(), "Search complete");

        let aggregator = ScoreAggregator::for_mode(mode);
        let embedding = request.embedding.as_slice();

        let (groups, assembled) = match mode.strategy {
            RetrievalStrategy::Chunks | RetrievalStrategy::ChunkGraph => {
                let ids: Vec<String> = hits.iter().map(|h| h.node.element_id.clone()).collect();
                let owners: HashMap<String, GraphNode> = self
                    .store
                    .chunk_documents(&ids)
                    .await?
                    .into_iter()
                    .map(|owned| (owned.chunk.element_id, owned.document))
                    .collect();
                let groups = aggregator.aggregate(hits, GroupBy::DocumentOf(&owners));
                let assembled = if mode.strategy == RetrievalStrategy::Chunks {
                    Self::chunk_text(mode, &groups)
                } else {
                    self.chunk_graph(mode, &groups, embedding).await?
                };
                (groups, assembled)
            }
            RetrievalStrategy::LocalCommunity => {
                let groups = aggregator.aggregate(hits, GroupBy::SelfGrouped);
                let entities = groups
                    .iter()
                    .flat_map(|g| g.items.iter().map(|i| i.node.clone()))
                    .collect();
                let local =
                    LocalContext::build(self.store.as_ref(), &self.config.retrieval, entities)
                        .await?;
                let assembled = Assembled {
                    text: local.text(),
                    graph: local.entity_graph(),
                };
                (groups, assembled)
            }
            RetrievalStrategy::GlobalCommunity => {
                let walker = CommunityWalker::new(
                    self.store.as_ref(),
                    self.config.retrieval.community_depth_cap,
                );
                let groups = walker.global_search(hits, &aggregator);
                let summaries: Vec<String> = groups
                    .iter()
                    .flat_map(|g| &g.items)
                    .map(|i| i.node.text_of(mode.text_fields))
                    .collect();
                let assembled = Assembled {
                    text: summaries.join(DIVIDER),
                    graph: Subgraph::new(),
                };
                (groups, assembled)
            }
            RetrievalStrategy::EntityGraph => {
                let groups = aggregator.aggregate(hits, GroupBy::SelfGrouped);
                // Without a query embedding the search score stands in for similarity
                let seeds = groups
                    .iter()
                    .flat_map(|g| &g.items)
                    .map(|i| EntitySeed {
                        node: i.node.clone(),
                        similarity: i.embedding.as_deref().map(|e| {
                            if embedding.is_empty() {
                                i.score as f32
                            } else {
                                cosine_similarity(e, embedding)
                            }
                        }),
                    })
                    .collect();
                let graph = SubgraphCollector::new(self.store.as_ref(), &self.config.retrieval)
                    .expand_entities(seeds)
                    .await?;
                let text = [
                    section("Entities", &node_lines(graph.nodes())),
                    section("Relationships", &relationship_lines(&graph)),
                ]
                .join(DIVIDER);
                (groups, Assembled { text, graph })
            }
        };

        Ok(Self::result(mode, &groups, assembled))
    }

    /// Vector search, plus keyword search merged in when the mode has a
    /// keyword index and the request a keyword.
    async fn search(&self, mode: &ModeConfig, request: &RetrievalRequest) -> Result<Vec<Hit>, AppError> {
        let document_names: &[String] = if mode.document_filter {
            &request.document_names
        } else {
            if !request.document_names.is_empty() {
                tracing::warn!(
                    mode = mode.id,
                    documents = request.document_names.len(),
                    "Mode does not filter by document, ignoring document names"
                );
            }
            &[]
        };

        let vector = VectorSearch {
            index: mode.vector_index,
            label: mode.node_label,
            embedding_field: mode.embedding_field,
            embedding: &request.embedding,
            top_k: mode.top_k,
            document_names,
        };
        let keyword = match (mode.keyword_index, request.keyword.as_deref()) {
            (Some(index), Some(keyword)) if !keyword.trim().is_empty() => Some(KeywordSearch {
                index,
                keyword,
                top_k: mode.top_k,
            }),
            _ => None,
        };

        match keyword {
            None => self.store.vector_search(&vector).await,
            Some(keyword) if request.embedding.is_empty() => {
                let hits = self.store.keyword_search(&keyword).await?;
                Ok(merge_hybrid(Vec::new(), hits, mode.top_k))
            }
            Some(keyword) => {
                let (vector_hits, keyword_hits) = tokio::try_join!(
                    self.store.vector_search(&vector),
                    self.store.keyword_search(&keyword)
                )?;
                tracing::debug!(
                    vector = vector_hits.len(),
                    keyword = keyword_hits.len(),
                    "Merging hybrid hits"
                );
                Ok(merge_hybrid(vector_hits, keyword_hits, mode.top_k))
            }
        }
    }

    /// Chunk texts of each group in document order.
    fn group_texts(mode: &ModeConfig, group: &RankedGroup) -> Vec<String> {
        group
            .items_in_document_order()
            .into_iter()
            .map(|i| i.node.text_of(mode.text_fields))
            .collect()
    }

    fn chunk_text(mode: &ModeConfig, groups: &[RankedGroup]) -> Assembled {
        let text = groups
            .iter()
            .flat_map(|g| Self::group_texts(mode, g))
            .collect::<Vec<_>>()
            .join(DIVIDER);
        Assembled {
            text,
            graph: Subgraph::new(),
        }
    }

    /// Expands each document group's entities concurrently; group texts stay
    /// in ranked order.
    async fn chunk_graph(
        &self,
        mode: &ModeConfig,
        groups: &[RankedGroup],
        embedding: &[f32],
    ) -> Result<Assembled, AppError> {
        let collector = SubgraphCollector::new(self.store.as_ref(), &self.config.retrieval);
        let collector = &collector;

        let graphs: Vec<Subgraph> = futures::stream::iter(groups.iter().map(|group| {
            let chunk_ids: Vec<String> = group
                .items
                .iter()
                .map(|i| i.node.element_id.clone())
                .collect();
            async move { collector.expand_chunks(&chunk_ids, embedding).await }
        }))
        .buffered(self.config.retrieval.concurrency.max(1))
        .try_collect()
        .await?;

        let mut merged = Subgraph::new();
        let mut texts = Vec::with_capacity(groups.len());
        for (group, graph) in groups.iter().zip(graphs) {
            texts.push(chunk_graph_text(&Self::group_texts(mode, group), &graph));
            merged.merge(graph);
        }

        Ok(Assembled {
            text: texts.join(DIVIDER),
            graph: merged,
        })
    }

    fn result(mode: &ModeConfig, groups: &[RankedGroup], assembled: Assembled) -> RetrievalResult {
        let sources: Vec<SourceDetails> = groups
            .iter()
            .map(|g| SourceDetails {
                source: match &g.owner {
                    Some(owner) => Document::from_node(owner).source(),
                    None => g.key().to_string(),
                },
                score: g.score,
                items: g.item_scores(),
            })
            .collect();
        let details: Vec<ItemScore> = sources.iter().flat_map(|s| s.items.clone()).collect();
        let score = match mode.strategy {
            RetrievalStrategy::Chunks | RetrievalStrategy::ChunkGraph => {
                groups.first().map(|g| g.score).unwrap_or_default()
            }
            // Self-grouped hits are averaged as one group
            RetrievalStrategy::LocalCommunity
            | RetrievalStrategy::GlobalCommunity
            | RetrievalStrategy::EntityGraph => {
                let scores: Vec<f64> = groups
                    .iter()
                    .flat_map(|g| &g.items)
                    .map(|i| i.score)
                    .collect();
                mean(&scores)
            }
        };

        RetrievalResult {
            score,
            metadata: RetrievalMetadata {
                mode: mode.id.to_string(),
                length: assembled.text.chars().count(),
                source: sources.first().map(|s| s.source.clone()),
                sources,
                details,
                entities: EntityIds {
                    entity_ids: assembled.graph.node_ids(),
                    relationship_ids: assembled.graph.relationship_ids(),
                },
            },
            text: assembled.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::FromRef;
    use serde_json::json;

    fn assembler(store: MemoryStore) -> ContextAssembler {
        let ctx = Context::new(Arc::new(store), Config::default());
        ContextAssembler::from_ref(&ctx)
    }

    fn store() -> MemoryStore {
        MemoryStore::new(
            serde_json::from_value(json!({
                "nodes": [
                    {"element_id": "d1", "labels": ["Document"], "properties": {"fileName": "doc1.pdf", "url": "None"}},
                    {"element_id": "c1", "labels": ["Chunk"], "properties": {"id": "k1", "text": "the analytical engine", "position": 1, "embedding": [1.0, 0.0]}},
                    {"element_id": "e1", "labels": ["__Entity__", "Machine"], "properties": {"id": "Engine", "description": "a machine"}}
                ],
                "relationships": [
                    {"element_id": "p1", "type": "PART_OF", "start": "c1", "end": "d1"},
                    {"element_id": "h1", "type": "HAS_ENTITY", "start": "c1", "end": "e1"}
                ]
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_mode_issues_no_query() {
        let store = Arc::new(store());
        let ctx = Context::new(store.clone(), Config::default());
        let assembler = ContextAssembler::from_ref(&ctx);

        let err = assembler
            .retrieve(
                &RetrievalRequest::new("nope", vec![1.0, 0.0]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownMode(_)));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_embedding_rejected() {
        let assembler = assembler(store());
        let err = assembler
            .retrieve(&RetrievalRequest::new("vector", vec![]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_graph_vector_bare_entity_line() {
        let assembler = assembler(store());
        let result = assembler
            .retrieve(
                &RetrievalRequest::new("graph_vector", vec![1.0, 0.0]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.text.contains("Entities:\nMachine:Engine (a machine)"));
        assert!(result.text.ends_with("Relationships:\n"));
        assert_eq!(result.metadata.source.as_deref(), Some("doc1.pdf"));
        assert_eq!(result.metadata.entities.entity_ids, vec!["e1"]);
        assert!(result.metadata.entities.relationship_ids.is_empty());
        assert_eq!(result.metadata.length, result.text.chars().count());
    }

    #[tokio::test]
    async fn test_cancelled_call_fails() {
        let assembler = assembler(store());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = assembler
            .retrieve(&RetrievalRequest::new("vector", vec![1.0, 0.0]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }
}
