//! [`GraphStore`] over parameterized Cypher.
//!
//! Every node is projected to `{element_id, labels, properties}` with the
//! embedding nulled and temporal values stringified, so rows decode straight
//! into [`GraphNode`]. Relationships are projected to
//! `{element_id, type, start, end}`.

use async_trait::async_trait;

use super::{
    ChunkLink, CommunityLink, EntityMention, GraphStore, Hit, KeywordSearch, OwnedChunk,
    Traversal, VectorSearch,
};
use crate::cypher;
use crate::error::AppError;
use crate::graph::{CypherExecutor, QueryExt, Row};
use crate::models::{
    ChunkText, GraphCounts, GraphNode, GraphPath, GraphRelationship, RelationshipRecord,
    EMBEDDING_PROPERTY, STRUCTURAL_TYPES,
};

/// Projection of node variable `v`.
fn node(v: &str) -> String {
    format!(
        "{{element_id: elementId({v}), labels: labels({v}), \
         properties: {v} {{.*, embedding: null, createdAt: toString({v}.createdAt), \
         updatedAt: toString({v}.updatedAt)}}}}"
    )
}

/// Projection of relationship variable `v`.
fn rel(v: &str) -> String {
    format!(
        "{{element_id: elementId({v}), type: type({v}), \
         start: elementId(startNode({v})), end: elementId(endNode({v}))}}"
    )
}

/// Quotes a label or property name for interpolation.
fn identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escapes Lucene query syntax so a keyword is matched literally.
pub(crate) fn escape_lucene(keyword: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn hit(row: &Row) -> Result<Hit, AppError> {
    Ok(Hit {
        node: row.get("node")?,
        score: row.get("score")?,
        embedding: row.get_opt("embedding")?,
    })
}

fn mention(row: &Row) -> Result<EntityMention, AppError> {
    Ok(EntityMention {
        chunk: row.get("chunk")?,
        relationship: row.get("relationship")?,
        entity: row.get("entity")?,
        embedding: row.get_opt("embedding")?,
    })
}

fn record(row: &Row) -> Result<RelationshipRecord, AppError> {
    Ok(RelationshipRecord {
        relationship: row.get("relationship")?,
        start: row.get("start")?,
        end: row.get("end")?,
    })
}

fn community_link(row: &Row) -> Result<CommunityLink, AppError> {
    Ok(CommunityLink {
        from: row.get("from_id")?,
        relationship: row.get("relationship")?,
        community: row.get("community")?,
    })
}

fn owned_chunk(row: &Row) -> Result<OwnedChunk, AppError> {
    Ok(OwnedChunk {
        chunk: row.get("chunk")?,
        document: row.get("document")?,
    })
}

fn decode_all<T>(rows: &[Row], f: impl Fn(&Row) -> Result<T, AppError>) -> Result<Vec<T>, AppError> {
    rows.iter().map(f).collect()
}

/// Graph store backed by a Cypher executor.
#[derive(Clone)]
pub struct CypherStore<E> {
    executor: E,
}

impl<E: CypherExecutor> CypherStore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    async fn mentions(&self, filter: &str, ids: &[String]) -> Result<Vec<EntityMention>, AppError> {
        let q = format!(
            "MATCH (c:Chunk)-[r:HAS_ENTITY]->(e)
             WHERE elementId({filter}) IN $ids
             RETURN {} AS chunk, {} AS relationship, {} AS entity, e.embedding AS embedding
             ORDER BY elementId(c), elementId(e), elementId(r)",
            node("c"),
            rel("r"),
            node("e"),
        );
        let rows = self.executor.query(&q).param("ids", ids).fetch_all().await?;
        decode_all(&rows, mention)
    }

    async fn community_links(
        &self,
        rel_type: &str,
        ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError> {
        let q = format!(
            "MATCH (n)-[r:{}]->(c:__Community__)
             WHERE elementId(n) IN $ids
             RETURN elementId(n) AS from_id, {} AS relationship, {} AS community
             ORDER BY from_id, elementId(c), elementId(r)",
            identifier(rel_type),
            rel("r"),
            node("c"),
        );
        let rows = self.executor.query(&q).param("ids", ids).fetch_all().await?;
        decode_all(&rows, community_link)
    }
}

#[async_trait]
impl<E: CypherExecutor> GraphStore for CypherStore<E> {
    async fn vector_search(&self, search: &VectorSearch<'_>) -> Result<Vec<Hit>, AppError> {
        let rows = if search.document_names.is_empty() {
            let q = format!(
                "CALL db.index.vector.queryNodes($index, $top_k, $embedding) YIELD node, score
                 RETURN {} AS node, score, node.{field} AS embedding
                 ORDER BY score DESC, elementId(node)",
                node("node"),
                field = identifier(search.embedding_field),
            );
            self.executor
                .query(&q)
                .param("index", search.index)
                .param("top_k", search.top_k)
                .param("embedding", search.embedding)
                .fetch_all()
                .await?
        } else {
            // The index cannot pre-filter, so score the allowed chunks exactly
            let q = format!(
                "MATCH (node:{label})-[:PART_OF]->(d:Document)
                 WHERE d.fileName IN $document_names AND node.{field} IS NOT NULL
                 WITH DISTINCT node, vector.similarity.cosine(node.{field}, $embedding) AS score
                 ORDER BY score DESC, elementId(node)
                 LIMIT $top_k
                 RETURN {} AS node, score, node.{field} AS embedding",
                node("node"),
                label = identifier(search.label),
                field = identifier(search.embedding_field),
            );
            self.executor
                .query(&q)
                .param("document_names", search.document_names)
                .param("top_k", search.top_k)
                .param("embedding", search.embedding)
                .fetch_all()
                .await?
        };
        decode_all(&rows, hit)
    }

    async fn keyword_search(&self, search: &KeywordSearch<'_>) -> Result<Vec<Hit>, AppError> {
        let q = format!(
            "CALL db.index.fulltext.queryNodes($index, $keyword, {{limit: $top_k}}) YIELD node, score
             RETURN {} AS node, score, node.{field} AS embedding
             ORDER BY score DESC, elementId(node)",
            node("node"),
            field = identifier(EMBEDDING_PROPERTY),
        );
        let rows = self
            .executor
            .query(&q)
            .param("index", search.index)
            .param("keyword", escape_lucene(search.keyword))
            .param("top_k", search.top_k)
            .fetch_all()
            .await?;
        decode_all(&rows, hit)
    }

    async fn chunk_documents(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError> {
        let q = format!(
            "MATCH (c:Chunk)-[:PART_OF]->(d:Document)
             WHERE elementId(c) IN $chunk_ids
             RETURN {} AS chunk, {} AS document",
            node("c"),
            node("d"),
        );
        let rows = cypher!(self.executor, &q, chunk_ids = chunk_ids)
            .fetch_all()
            .await?;
        decode_all(&rows, owned_chunk)
    }

    async fn chunk_entities(&self, chunk_ids: &[String]) -> Result<Vec<EntityMention>, AppError> {
        self.mentions("c", chunk_ids).await
    }

    async fn entity_chunks(&self, entity_ids: &[String]) -> Result<Vec<EntityMention>, AppError> {
        self.mentions("e", entity_ids).await
    }

    async fn entity_paths(
        &self,
        entity_id: &str,
        traversal: &Traversal<'_>,
    ) -> Result<Vec<GraphPath>, AppError> {
        // Variable-length bounds cannot be parameters
        let q = format!(
            "MATCH (e) WHERE elementId(e) = $entity_id
             MATCH path = (e)-[rels*0..{depth}]-(m)
             WHERE none(r IN rels WHERE type(r) IN $excluded_types)
               AND none(n IN nodes(path) WHERE any(l IN labels(n) WHERE l IN $excluded_labels))
             WITH path
             ORDER BY length(path), [r IN relationships(path) | elementId(r)]
             LIMIT $limit
             RETURN [n IN nodes(path) | {}] AS nodes,
                    [r IN relationships(path) | {}] AS relationships",
            node("n"),
            rel("r"),
            depth = traversal.max_depth,
        );
        let rows = self
            .executor
            .query(&q)
            .param("entity_id", entity_id)
            .param("excluded_types", traversal.excluded_types)
            .param("excluded_labels", traversal.excluded_labels)
            .param("limit", traversal.limit)
            .fetch_all()
            .await?;
        decode_all(&rows, |row| {
            Ok(GraphPath {
                nodes: row.get("nodes")?,
                relationships: row.get("relationships")?,
            })
        })
    }

    async fn relationships_among(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        let q = format!(
            "MATCH (a)-[r]->(b)
             WHERE elementId(a) IN $entity_ids AND elementId(b) IN $entity_ids
               AND NOT type(r) IN $structural
             RETURN {} AS relationship, {} AS start, {} AS end
             ORDER BY elementId(r)",
            rel("r"),
            node("a"),
            node("b"),
        );
        let rows = cypher!(
            self.executor,
            &q,
            entity_ids = entity_ids,
            structural = STRUCTURAL_TYPES
        )
        .fetch_all()
        .await?;
        decode_all(&rows, record)
    }

    async fn entity_neighbors(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        let q = format!(
            "MATCH (a)-[r]-(b:__Entity__)
             WHERE elementId(a) IN $entity_ids AND NOT elementId(b) IN $entity_ids
               AND NOT type(r) IN $structural
             WITH DISTINCT r
             WITH r, startNode(r) AS s, endNode(r) AS t
             RETURN {} AS relationship, {} AS start, {} AS end
             ORDER BY elementId(r)",
            rel("r"),
            node("s"),
            node("t"),
        );
        let rows = cypher!(
            self.executor,
            &q,
            entity_ids = entity_ids,
            structural = STRUCTURAL_TYPES
        )
        .fetch_all()
        .await?;
        decode_all(&rows, record)
    }

    async fn community_memberships(
        &self,
        entity_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError> {
        self.community_links("IN_COMMUNITY", entity_ids).await
    }

    async fn parent_communities(
        &self,
        community_ids: &[String],
    ) -> Result<Vec<CommunityLink>, AppError> {
        self.community_links("PARENT_COMMUNITY", community_ids).await
    }

    async fn documents_by_name(&self, names: &[String]) -> Result<Vec<GraphNode>, AppError> {
        let q = format!(
            "MATCH (d:Document)
             WHERE d.fileName IN $names
             RETURN {} AS document
             ORDER BY d.createdAt DESC, elementId(d)",
            node("d"),
        );
        let rows = cypher!(self.executor, &q, names = names).fetch_all().await?;
        decode_all(&rows, |row| row.get("document"))
    }

    async fn document_chunks(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ChunkLink>, AppError> {
        let q = format!(
            "MATCH (d:Document)<-[:PART_OF|FIRST_CHUNK]-(c:Chunk)
             WHERE elementId(d) = $document_id
             WITH DISTINCT d, c
             ORDER BY c.position, elementId(c)
             LIMIT $limit
             MATCH (d)<-[r:PART_OF|FIRST_CHUNK]-(c)
             RETURN {} AS chunk, {} AS relationship
             ORDER BY c.position, elementId(c), elementId(r)",
            node("c"),
            rel("r"),
        );
        let rows = cypher!(self.executor, &q, document_id = document_id, limit = limit)
            .fetch_all()
            .await?;
        decode_all(&rows, |row| {
            Ok(ChunkLink {
                chunk: row.get("chunk")?,
                relationship: row.get("relationship")?,
            })
        })
    }

    async fn chunk_links(&self, chunk_ids: &[String]) -> Result<Vec<GraphRelationship>, AppError> {
        let q = format!(
            "MATCH (a:Chunk)-[r:NEXT_CHUNK|SIMILAR]->(b:Chunk)
             WHERE elementId(a) IN $chunk_ids AND elementId(b) IN $chunk_ids
             RETURN {} AS relationship
             ORDER BY elementId(r)",
            rel("r"),
        );
        let rows = cypher!(self.executor, &q, chunk_ids = chunk_ids)
            .fetch_all()
            .await?;
        decode_all(&rows, |row| row.get("relationship"))
    }

    async fn nodes_by_ids(&self, ids: &[String]) -> Result<Vec<GraphNode>, AppError> {
        let q = format!(
            "MATCH (n) WHERE elementId(n) IN $ids
             RETURN {} AS node
             ORDER BY elementId(n)",
            node("n"),
        );
        let rows = cypher!(self.executor, &q, ids = ids).fetch_all().await?;
        decode_all(&rows, |row| row.get("node"))
    }

    async fn relationships_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<RelationshipRecord>, AppError> {
        let q = format!(
            "MATCH (a)-[r]->(b) WHERE elementId(r) IN $ids
             RETURN {} AS relationship, {} AS start, {} AS end
             ORDER BY elementId(r)",
            rel("r"),
            node("a"),
            node("b"),
        );
        let rows = cypher!(self.executor, &q, ids = ids).fetch_all().await?;
        decode_all(&rows, record)
    }

    async fn chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<OwnedChunk>, AppError> {
        let q = format!(
            "MATCH (c:Chunk)-[:PART_OF]->(d:Document)
             WHERE c.id IN $chunk_ids
             RETURN {} AS chunk, {} AS document
             ORDER BY c.position, elementId(c)",
            node("c"),
            node("d"),
        );
        let rows = cypher!(self.executor, &q, chunk_ids = chunk_ids)
            .fetch_all()
            .await?;
        decode_all(&rows, owned_chunk)
    }

    async fn count_chunks(&self, file_name: &str) -> Result<usize, AppError> {
        let row = cypher!(
            self.executor,
            "MATCH (d:Document {fileName: $file_name})<-[:PART_OF]-(c:Chunk)
             RETURN count(c) AS total_chunks",
            file_name = file_name
        )
        .fetch_one()
        .await?;
        let total: i64 = match row {
            Some(row) => row.get("total_chunks")?,
            None => 0,
        };
        Ok(total.max(0) as usize)
    }

    async fn chunk_texts(
        &self,
        file_name: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ChunkText>, AppError> {
        let rows = cypher!(
            self.executor,
            "MATCH (d:Document {fileName: $file_name})<-[:PART_OF]-(c:Chunk)
             RETURN c.text AS text, c.position AS position, c.page_number AS page_number
             ORDER BY c.position, elementId(c)
             SKIP $skip
             LIMIT $limit",
            file_name = file_name,
            skip = skip,
            limit = limit
        )
        .fetch_all()
        .await?;
        decode_all(&rows, |row| {
            Ok(ChunkText {
                text: row.get_opt("text")?.unwrap_or_default(),
                position: row.get("position")?,
                page_number: row.get_opt("page_number")?,
            })
        })
    }

    async fn document_graph_counts(&self, file_name: &str) -> Result<GraphCounts, AppError> {
        let row = cypher!(
            self.executor,
            "MATCH (d:Document {fileName: $file_name})<-[:PART_OF]-(:Chunk)-[:HAS_ENTITY]->(e)
             OPTIONAL MATCH (d)<-[:PART_OF]-(:Chunk)-[:HAS_ENTITY]->(e2:!Chunk)-[rel]-(e)
             RETURN count(DISTINCT e) AS nodes, count(DISTINCT rel) AS rels",
            file_name = file_name
        )
        .fetch_one()
        .await?;
        match row {
            Some(row) => Ok(GraphCounts {
                nodes: row.get("nodes")?,
                rels: row.get("rels")?,
            }),
            None => Ok(GraphCounts::default()),
        }
    }

    async fn orphaned_entities(&self, file_name: &str) -> Result<Vec<GraphNode>, AppError> {
        let q = format!(
            "MATCH (d:Document {{fileName: $file_name}})<-[:PART_OF]-(:Chunk)-[:HAS_ENTITY]->(e)
             WHERE NOT EXISTS {{
                 MATCH (e)<-[:HAS_ENTITY]-(:Chunk)-[:PART_OF]->(other:Document)
                 WHERE other <> d
             }}
             WITH DISTINCT e
             RETURN {} AS entity
             ORDER BY elementId(e)",
            node("e"),
        );
        let rows = cypher!(self.executor, &q, file_name = file_name)
            .fetch_all()
            .await?;
        decode_all(&rows, |row| row.get("entity"))
    }
}
