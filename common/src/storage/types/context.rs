use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::opt::PatchOp;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{context_graph::scope_key, context_node::ContextNode, graph_edge::GraphEdge};

/// Enumerated content classification for a captured [`Context`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Conversation,
    Code,
    Documentation,
    Research,
    Idea,
    Task,
    Note,
    Meeting,
    Email,
    Webpage,
}

/// Provenance of a captured context: what captured it, by whom, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSource {
    pub kind: String,
    pub agent: Option<String>,
    pub captured_at: DateTime<Utc>,
}

stored_object!(Context, "contexts", {
    user_id: String,
    project_id: Option<String>,
    title: String,
    content: String,
    context_type: ContextType,
    source: Option<ContextSource>,
    tags: Vec<String>,
    metadata: Option<Value>,
    chunk_count: u32,
    has_nodes: bool
});

/// Fields accepted on context creation.
pub struct NewContext {
    pub title: String,
    pub content: String,
    pub context_type: ContextType,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<ContextSource>,
    pub metadata: Option<Value>,
}

/// A cursor-paginated page of contexts, ordered by `updated_at` desc.
pub struct ContextPage {
    pub items: Vec<Context>,
    pub next_cursor: Option<String>,
}

impl Context {
    /// `CreateContext(userId, input) -> Context`. Fails `InvalidInput` on empty content.
    pub fn new(user_id: String, input: NewContext) -> Result<Self, AppError> {
        if input.content.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            project_id: input.project_id,
            title: input.title,
            content: input.content,
            context_type: input.context_type,
            source: input.source,
            tags: input.tags,
            metadata: input.metadata,
            chunk_count: 0,
            has_nodes: false,
        })
    }

    /// `GetContext(userId, id) -> Context`. Fails `NotFound` or `Forbidden` on owner mismatch.
    pub async fn get(db: &SurrealDbClient, user_id: &str, id: &str) -> Result<Self, AppError> {
        let context: Option<Self> = db.get_item(id).await?;
        let context = context.ok_or_else(|| AppError::NotFound(format!("context {id}")))?;
        if context.user_id != user_id {
            return Err(AppError::Forbidden(format!("context {id}")));
        }
        Ok(context)
    }

    /// `ListContexts(userId, {projectId?, limit, cursor}) -> page`, ordered by `updated_at` desc.
    ///
    /// The cursor is the opaque pair `(updated_at_rfc3339, id)` of the last item on the
    /// previous page, which keeps pagination stable under concurrent inserts.
    pub async fn list(
        db: &SurrealDbClient,
        user_id: &str,
        project_id: Option<&str>,
        limit: u32,
        cursor: Option<(DateTime<Utc>, String)>,
    ) -> Result<ContextPage, AppError> {
        let mut query = String::from(
            "SELECT * FROM contexts WHERE user_id = $user_id",
        );
        if project_id.is_some() {
            query.push_str(" AND project_id = $project_id");
        }
        if cursor.is_some() {
            query.push_str(" AND (updated_at, id) < ($cursor_updated_at, $cursor_id)");
        }
        query.push_str(" ORDER BY updated_at DESC, id DESC LIMIT $limit");

        let mut q = db.client.query(query).bind(("user_id", user_id.to_string()));
        if let Some(p) = project_id {
            q = q.bind(("project_id", p.to_string()));
        }
        if let Some((updated_at, id)) = cursor.clone() {
            q = q
                .bind(("cursor_updated_at", updated_at))
                .bind(("cursor_id", id));
        }
        // fetch one extra to know whether another page follows
        q = q.bind(("limit", i64::from(limit) + 1));

        let mut result = q.await?;
        let mut items: Vec<Self> = result.take(0)?;

        let next_cursor = if items.len() > limit as usize {
            items.truncate(limit as usize);
            items
                .last()
                .map(|c| format!("{}|{}", c.updated_at.to_rfc3339(), c.id))
        } else {
            None
        };

        Ok(ContextPage { items, next_cursor })
    }

    /// `DeleteContext(userId, id) -> ok`. Cascades to nodes and their incident graph edges.
    pub async fn delete(db: &SurrealDbClient, user_id: &str, id: &str) -> Result<(), AppError> {
        let context = Self::get(db, user_id, id).await?;
        let scope = scope_key(&context.user_id, context.project_id.as_deref());
        let deleted_node_ids = ContextNode::delete_by_context(db, &context.id).await?;
        for node_id in &deleted_node_ids {
            GraphEdge::delete_incident(db, &scope, node_id).await?;
        }
        let _: Option<Self> = db.delete_item(&context.id).await?;
        Ok(())
    }

    /// Updates `chunk_count`/`has_nodes` after chunking, maintaining the store invariant
    /// `has_nodes <=> chunk_count > 0`.
    pub async fn set_chunk_count(
        db: &SurrealDbClient,
        id: &str,
        chunk_count: u32,
    ) -> Result<(), AppError> {
        let _: Option<Self> = db
            .client
            .update(("contexts", id))
            .patch(PatchOp::replace("/chunk_count", chunk_count))
            .patch(PatchOp::replace("/has_nodes", chunk_count > 0))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;
        Ok(())
    }
}
