//! Macro for convenient Cypher query construction.

/// Macro for inline Cypher queries with optional parameters.
///
/// # Usage
///
/// ```ignore
/// use kgrag::graph::cypher;
///
/// // Query without parameters
/// let query = cypher!(executor, "MATCH (c:Chunk) RETURN count(c) AS total");
///
/// // Query with parameters
/// let query = cypher!(
///     executor,
///     "MATCH (d:Document {fileName: $file_name})<-[:PART_OF]-(c:Chunk) RETURN c LIMIT $limit",
///     file_name = name,
///     limit = 10
/// );
///
/// let rows = query.fetch_all().await?;
/// ```
#[macro_export]
macro_rules! cypher {
    // Query without parameters
    ($graph:expr, $query:expr) => {
        $graph.query($query)
    };
    // Query with parameters
    ($graph:expr, $query:expr, $($name:ident = $value:expr),+ $(,)?) => {
        $graph.query($query)$(.param(stringify!($name), $value))+
    };
}
