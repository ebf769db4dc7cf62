//! Read-only document helpers.

use std::sync::Arc;

use crate::config::Config;
use crate::context::Context;
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{ChunkText, ExportNode, GraphCounts};
use crate::store::AppStore;

/// Per-document counts and listings.
#[derive(FromContext, Clone)]
pub struct DocumentService {
    store: AppStore,
    config: Arc<Config>,
}

impl DocumentService {
    /// Number of chunks in a document; 0 for unknown documents.
    pub async fn count_chunks(&self, file_name: &str) -> Result<usize, AppError> {
        self.store.count_chunks(file_name).await
    }

    /// A page of chunk texts in `position` order. A `limit` of 0 means the
    /// configured export chunk limit.
    pub async fn chunk_texts(
        &self,
        file_name: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ChunkText>, AppError> {
        let limit = if limit == 0 {
            self.config.export.chunk_limit
        } else {
            limit
        };
        self.store.chunk_texts(file_name, skip, limit).await
    }

    pub async fn graph_counts(&self, file_name: &str) -> Result<GraphCounts, AppError> {
        self.store.document_graph_counts(file_name).await
    }

    /// Entities only this document mentions; the ones that would become
    /// orphans if it were deleted.
    pub async fn orphaned_entities(&self, file_name: &str) -> Result<Vec<ExportNode>, AppError> {
        let entities = self.store.orphaned_entities(file_name).await?;
        tracing::debug!(file_name, orphans = entities.len(), "Listed orphaned entities");
        Ok(entities.iter().map(ExportNode::summary).collect())
    }
}
