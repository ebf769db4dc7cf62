//! Application context providing dependency injection root.

use std::sync::Arc;

use crate::config::Config;
use crate::di::Context as ContextDerive;
use crate::error::AppError;
use crate::graph::backends::neo4j::Neo4jClient;
use crate::retrieval::ModeRegistry;
use crate::store::{AppStore, CypherStore};

/// Root application context for dependency injection.
///
/// The Context holds all shared dependencies and uses `#[derive(Context)]`
/// to generate `FromRef` implementations for each field, enabling
/// compile-time dependency resolution.
#[derive(ContextDerive, Clone)]
pub struct Context {
    /// Graph store; Neo4j in production, in-memory for fixtures and tests.
    pub store: AppStore,
    /// Application configuration.
    pub config: Arc<Config>,
    /// Retrieval modes, built once.
    pub modes: Arc<ModeRegistry>,
}

impl Context {
    /// Creates a context over an existing store with the standard modes.
    pub fn new(store: AppStore, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
            modes: Arc::new(ModeRegistry::standard()),
        }
    }

    /// Connects to the configured Neo4j database.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let neo4j = config.neo4j.as_ref().ok_or_else(|| {
            AppError::Validation("no [neo4j] section configured".to_string())
        })?;

        tracing::info!(uri = %neo4j.uri, "Connecting to Neo4j");
        let client = Neo4jClient::connect(neo4j).await?;
        Ok(Self::new(Arc::new(CypherStore::new(client)), config))
    }
}
