//! Neo4j backend implementation.
//!
//! Wraps the `neo4rs` driver's pooled [`neo4rs::Graph`] and exposes it as a
//! [`CypherExecutor`]. Rows are converted to JSON maps column by column, so
//! queries should project temporal values with `toString(...)`.
//!
//! # Example
//!
//! ```ignore
//! use kgrag::graph::backends::neo4j::Neo4jClient;
//! use kgrag::graph::QueryExt;
//!
//! let client = Neo4jClient::connect(&config.neo4j).await?;
//! let rows = client.query("MATCH (d:Document) RETURN d.fileName AS name")
//!     .fetch_all()
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder};
use serde_json::Value as JsonValue;

use crate::config::Neo4jConfig;
use crate::error::AppError;
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::CypherExecutor;

/// Neo4j graph client.
///
/// This type is cheap to clone - the driver's connection pool is `Arc`-based.
#[derive(Clone)]
pub struct Neo4jClient {
    graph: Arc<neo4rs::Graph>,
}

impl Neo4jClient {
    /// Connects to Neo4j with the configured pool size.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, AppError> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_deref().unwrap_or(""))
            .max_connections(config.max_connections);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }

        let graph = neo4rs::Graph::connect(builder.build()?).await?;
        tracing::info!(uri = %config.uri, "Connected to Neo4j");

        Ok(Self {
            graph: Arc::new(graph),
        })
    }
}

#[async_trait]
impl CypherExecutor for Neo4jClient {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        use async_stream::try_stream;

        let mut query = neo4rs::query(cypher);
        for (name, value) in params {
            query = query.param(&name, json_to_bolt(value));
        }

        tracing::trace!(cypher, "Executing Cypher");
        let mut result = self.graph.execute(query).await?;
        let cypher = cypher.to_string();

        Ok(Box::pin(try_stream! {
            while let Some(row) = result.next().await? {
                let data: HashMap<String, JsonValue> = row.to().map_err(|e| AppError::Query {
                    message: format!("failed to decode row: {}", e),
                    query: cypher.clone(),
                })?;
                yield Row::new(data);
            }
        }))
    }
}

/// Converts a JSON parameter into the driver's Bolt representation.
fn json_to_bolt(value: JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => BoltType::from(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => BoltType::from(s),
        JsonValue::Array(items) => BoltType::List(BoltList::from(
            items.into_iter().map(json_to_bolt).collect::<Vec<_>>(),
        )),
        JsonValue::Object(map) => {
            let mut bolt = BoltMap::new();
            for (k, v) in map {
                bolt.put(BoltString::from(k.as_str()), json_to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}
