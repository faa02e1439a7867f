//! Text search: BM25-style ranking over the node inverted index, already newer-first
//! tie-broken by the store query itself.

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::context_node::ScoredNode,
    },
};

/// `Text(query, filters, limit)`. Always succeeds if the store is reachable — a full-text
/// index lookup has no external provider dependency to degrade from.
pub async fn search_text(
    db: &SurrealDbClient,
    user_id: &str,
    query: &str,
    context_id: Option<&str>,
    limit: u32,
) -> Result<Vec<ScoredNode>, AppError> {
    common::storage::types::context_node::ContextNode::search_text(
        db, user_id, query, context_id, limit,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::context::{Context, ContextType, NewContext};
    use common::storage::types::context_node::{ChunkType, ContextNode};

    async fn seeded_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_initialized(4).await.expect("init schema");
        db
    }

    fn node(context_id: &str, content: &str, index: u32) -> ContextNode {
        let now = chrono::Utc::now();
        ContextNode {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            context_id: context_id.to_string(),
            parent_node_id: None,
            child_node_ids: vec![],
            content: content.to_string(),
            token_count: 10,
            chunk_type: ChunkType::Paragraph,
            chunk_index: index,
            importance: 0.6,
            title: "chunk".to_string(),
            summary: String::new(),
            keywords: vec![],
            embedding: None,
            embedding_model_version: None,
            needs_reenrichment: false,
        }
    }

    #[tokio::test]
    async fn finds_matching_content() {
        let db = seeded_db().await;
        let ctx = Context::new(
            "u1".to_string(),
            NewContext {
                title: "S".to_string(),
                content: "chunking system performance overview".to_string(),
                context_type: ContextType::Note,
                project_id: None,
                tags: vec![],
                source: None,
                metadata: None,
            },
        )
        .unwrap();
        db.store_item(ctx.clone()).await.unwrap();
        ContextNode::upsert_for_context(
            &db,
            &ctx.id,
            vec![node(&ctx.id, "chunking system performance overview", 0)],
        )
        .await
        .unwrap();

        let hits = search_text(&db, "u1", "chunking performance", None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn context_filter_narrows_results() {
        let db = seeded_db().await;
        let ctx_a = Context::new(
            "u1".to_string(),
            NewContext {
                title: "A".to_string(),
                content: "shared keyword alpha".to_string(),
                context_type: ContextType::Note,
                project_id: None,
                tags: vec![],
                source: None,
                metadata: None,
            },
        )
        .unwrap();
        let ctx_b = Context::new(
            "u1".to_string(),
            NewContext {
                title: "B".to_string(),
                content: "shared keyword beta".to_string(),
                context_type: ContextType::Note,
                project_id: None,
                tags: vec![],
                source: None,
                metadata: None,
            },
        )
        .unwrap();
        db.store_item(ctx_a.clone()).await.unwrap();
        db.store_item(ctx_b.clone()).await.unwrap();
        ContextNode::upsert_for_context(&db, &ctx_a.id, vec![node(&ctx_a.id, "shared keyword alpha", 0)])
            .await
            .unwrap();
        ContextNode::upsert_for_context(&db, &ctx_b.id, vec![node(&ctx_b.id, "shared keyword beta", 0)])
            .await
            .unwrap();

        let all = search_text(&db, "u1", "shared keyword", None, 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = search_text(&db, "u1", "shared keyword", Some(&ctx_a.id), 10)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].node.context_id, ctx_a.id);
    }
}
