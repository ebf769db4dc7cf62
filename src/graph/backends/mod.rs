//! Backend implementations for different graph databases.
//!
//! Each backend implements [`CypherExecutor`](crate::graph::CypherExecutor).
//!
//! # Available Backends
//!
//! | Backend | Module | Status |
//! |---------|--------|--------|
//! | Neo4j 5.x (vector + fulltext indexes) | [`neo4j`] | Available |
//!
//! # Implementing a Backend
//!
//! 1. Create a client struct wrapping the driver's connection pool
//! 2. Implement `CypherExecutor`, converting driver rows into JSON [`Row`](crate::graph::Row)s
//! 3. Map connection failures to [`AppError::StoreUnavailable`](crate::error::AppError)

pub mod neo4j;
