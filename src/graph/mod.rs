//! Cypher execution layer.
//!
//! A thin, backend-agnostic way to run parameterized Cypher and read rows
//! back as JSON:
//!
//! - [`CypherExecutor`] - Execute Cypher queries (implemented by each backend)
//! - [`Query`] / [`QueryExt`] - Fluent parameter binding
//! - [`Row`] - Typed column extraction
//!
//! # Usage
//!
//! ```ignore
//! use kgrag::graph::QueryExt;
//!
//! let rows = client
//!     .query("MATCH (d:Document) WHERE d.fileName IN $names RETURN d.fileName AS name")
//!     .param("names", &names)
//!     .fetch_all()
//!     .await?;
//! let name: String = rows[0].get("name")?;
//! ```

mod macros;
mod query;
mod row;
mod traits;

pub mod backends;

// Re-export core types
pub use query::{Query, QueryExt};
pub use row::{Params, Row, RowStream};
pub use traits::CypherExecutor;

// Re-export macro (defined at crate root via #[macro_export])
#[doc(inline)]
pub use crate::cypher;
