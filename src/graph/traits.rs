//! The seam between the Cypher stores and a concrete database driver.
//!
//! Retrieval and export are read-only, so backends only need to execute
//! Cypher and stream rows back. Connection pooling and session lifetime are
//! the backend's concern; a session is never held beyond one query.

use async_trait::async_trait;

use crate::error::AppError;
use crate::graph::row::{Params, RowStream};

/// Runs parameterized Cypher and streams JSON rows.
#[async_trait]
pub trait CypherExecutor: Send + Sync {
    /// Executes `cypher` with `params` bound by name (`$name`).
    async fn execute_cypher(&self, cypher: &str, params: Params)
        -> Result<RowStream<'_>, AppError>;
}
