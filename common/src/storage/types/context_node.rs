use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Dominant structural kind detected for a chunk by the Smart Chunker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Paragraph,
    Code,
    Heading,
    List,
    Table,
    Mixed,
}

stored_object!(ContextNode, "context_node", {
    context_id: String,
    parent_node_id: Option<String>,
    child_node_ids: Vec<String>,
    content: String,
    token_count: u32,
    chunk_type: ChunkType,
    chunk_index: u32,
    importance: f32,
    title: String,
    summary: String,
    keywords: Vec<String>,
    embedding: Option<Vec<f32>>,
    embedding_model_version: Option<String>,
    needs_reenrichment: bool
});

/// A node carrying a relevance score from a search/ranking operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: ContextNode,
    pub score: f32,
}

impl ContextNode {
    /// `UpsertNodes(contextId, nodes[]) -> ok`, atomic per context: either all nodes for
    /// that context are replaced, or none are.
    pub async fn upsert_for_context(
        db: &SurrealDbClient,
        context_id: &str,
        nodes: Vec<Self>,
    ) -> Result<(), AppError> {
        let mut query = db
            .client
            .query("BEGIN TRANSACTION;")
            .query("DELETE FROM context_node WHERE context_id = $context_id;")
            .bind(("context_id", context_id.to_string()));

        for node in &nodes {
            query = query
                .query("CREATE type::thing('context_node', $id) CONTENT $node;")
                .bind(("id", node.id.clone()))
                .bind(("node", node.clone()));
        }

        query.query("COMMIT TRANSACTION;").await?.check()?;

        Ok(())
    }

    /// `GetNodes(contextId) -> nodes[]` ordered by `chunk_index`.
    pub async fn get_for_context(
        db: &SurrealDbClient,
        context_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut result = db
            .client
            .query("SELECT * FROM context_node WHERE context_id = $context_id ORDER BY chunk_index ASC")
            .bind(("context_id", context_id.to_string()))
            .await?;
        Ok(result.take(0)?)
    }

    /// Deletes all nodes owned by a context, cascading to their incident graph edges is
    /// the caller's responsibility (see `GraphEdge::delete_incident`).
    pub async fn delete_by_context(
        db: &SurrealDbClient,
        context_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut result = db
            .client
            .query("DELETE FROM context_node WHERE context_id = $context_id RETURN BEFORE")
            .bind(("context_id", context_id.to_string()))
            .await?;
        let deleted: Vec<Self> = result.take(0)?;
        Ok(deleted.into_iter().map(|n| n.id).collect())
    }

    /// `SearchNodesText(userId, query, filters, limit) -> scored nodes`, backed by the
    /// BM25-style full-text index on content/title/keywords. `context_id` narrows the
    /// candidate pool to a single context, as the search API's optional `contextId` filter
    /// and the Graph mode's seed-context lookup both require.
    pub async fn search_text(
        db: &SurrealDbClient,
        user_id: &str,
        query: &str,
        context_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ScoredNode>, AppError> {
        let mut sql = String::from(
            "SELECT *, \
                (search::score(1) * 1.0 + search::score(2) * 1.5 + search::score(3) * 0.8) AS score \
             FROM context_node \
             WHERE context_id IN (SELECT VALUE id FROM contexts WHERE user_id = $user_id) \
               AND (content @1@ $query OR title @2@ $query OR keywords @3@ $query)",
        );
        if context_id.is_some() {
            sql.push_str(" AND context_id = $context_id");
        }
        sql.push_str(" ORDER BY score DESC, created_at DESC LIMIT $limit");

        let mut q = db
            .client
            .query(sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("query", query.to_string()))
            .bind(("limit", i64::from(limit)));
        if let Some(id) = context_id {
            q = q.bind(("context_id", id.to_string()));
        }
        let mut result = q.await?;

        #[derive(Deserialize)]
        struct Row {
            #[serde(flatten)]
            node: ContextNode,
            score: f32,
        }
        let rows: Vec<Row> = result.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoredNode {
                node: r.node,
                score: r.score,
            })
            .collect())
    }

    /// `Semantic` candidate retrieval: HNSW K-nearest-neighbor lookup over `embedding`.
    /// `context_id` narrows the candidate pool the same way as [`Self::search_text`].
    pub async fn vector_search(
        db: &SurrealDbClient,
        user_id: &str,
        query_vector: &[f32],
        context_id: Option<&str>,
        limit: u32,
        ef: u32,
    ) -> Result<Vec<ScoredNode>, AppError> {
        let mut sql = String::from(
            "SELECT *, vector::similarity::cosine(embedding, $vec) AS score \
             FROM context_node \
             WHERE context_id IN (SELECT VALUE id FROM contexts WHERE user_id = $user_id) \
               AND embedding <|$limit,$ef|> $vec",
        );
        if context_id.is_some() {
            sql.push_str(" AND context_id = $context_id");
        }
        sql.push_str(" ORDER BY score DESC");

        let mut q = db
            .client
            .query(sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("vec", query_vector.to_vec()))
            .bind(("limit", i64::from(limit)))
            .bind(("ef", i64::from(ef)));
        if let Some(id) = context_id {
            q = q.bind(("context_id", id.to_string()));
        }
        let mut result = q.await?;

        #[derive(Deserialize)]
        struct Row {
            #[serde(flatten)]
            node: ContextNode,
            score: f32,
        }
        let rows: Vec<Row> = result.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoredNode {
                node: r.node,
                score: r.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(context_id: &str, index: u32) -> ContextNode {
        let now = Utc::now();
        ContextNode {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            context_id: context_id.to_string(),
            parent_node_id: None,
            child_node_ids: vec![],
            content: format!("chunk body {index}"),
            token_count: 10,
            chunk_type: ChunkType::Paragraph,
            chunk_index: index,
            importance: 0.6,
            title: format!("chunk {index}"),
            summary: String::new(),
            keywords: vec![],
            embedding: None,
            embedding_model_version: None,
            needs_reenrichment: false,
        }
    }

    #[tokio::test]
    async fn upsert_is_atomic_replace() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(1536).await.expect("init schema");

        let context_id = "ctx1";
        ContextNode::upsert_for_context(
            &db,
            context_id,
            vec![sample(context_id, 0), sample(context_id, 1)],
        )
        .await
        .expect("first upsert");

        let nodes = ContextNode::get_for_context(&db, context_id)
            .await
            .expect("get");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].chunk_index, 0);
        assert_eq!(nodes[1].chunk_index, 1);

        ContextNode::upsert_for_context(&db, context_id, vec![sample(context_id, 0)])
            .await
            .expect("second upsert replaces");

        let nodes = ContextNode::get_for_context(&db, context_id)
            .await
            .expect("get after replace");
        assert_eq!(nodes.len(), 1);
    }
}
