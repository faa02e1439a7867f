use chrono::{DateTime, Utc};
use surrealdb::opt::PatchOp;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(ContextGraph, "context_graph", {
    user_id: String,
    project_id: Option<String>,
    state: String,
    node_ids: Vec<String>,
    version: u64,
    last_built_at: Option<DateTime<Utc>>,
    removed_since_compaction: u32
});

/// `Scope` is the ownership boundary for a graph: `(userId, projectId or null)`. A missing
/// `projectId` is the first-class "personal" scope, not an error.
pub fn scope_key(user_id: &str, project_id: Option<&str>) -> String {
    match project_id {
        Some(p) => format!("{user_id}:{p}"),
        None => format!("{user_id}:personal"),
    }
}

impl ContextGraph {
    pub fn new(user_id: String, project_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: scope_key(&user_id, project_id.as_deref()),
            created_at: now,
            updated_at: now,
            user_id,
            project_id,
            state: "Empty".to_string(),
            node_ids: Vec::new(),
            version: 0,
            last_built_at: None,
            removed_since_compaction: 0,
        }
    }

    pub async fn get_or_create(
        db: &SurrealDbClient,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<Self, AppError> {
        let id = scope_key(user_id, project_id);
        if let Some(existing) = db.get_item::<Self>(&id).await? {
            return Ok(existing);
        }
        let graph = Self::new(user_id.to_string(), project_id.map(str::to_string));
        db.store_item(graph.clone()).await?;
        Ok(graph)
    }

    /// Scope-atomic: bumps `version`, replaces `node_ids`, sets `state`, and stamps
    /// `last_built_at` in a single patch so readers never observe a partially-built graph.
    pub async fn commit_build(
        db: &SurrealDbClient,
        id: &str,
        node_ids: Vec<String>,
        state: &str,
    ) -> Result<(), AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let next_version = current.map(|c| c.version + 1).unwrap_or(1);
        let _: Option<Self> = db
            .client
            .update(("context_graph", id))
            .patch(PatchOp::replace("/node_ids", node_ids))
            .patch(PatchOp::replace("/state", state))
            .patch(PatchOp::replace("/version", next_version))
            .patch(PatchOp::replace(
                "/last_built_at",
                surrealdb::sql::Datetime::default(),
            ))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;
        Ok(())
    }

    pub async fn set_state(db: &SurrealDbClient, id: &str, state: &str) -> Result<(), AppError> {
        let _: Option<Self> = db
            .client
            .update(("context_graph", id))
            .patch(PatchOp::replace("/state", state))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;
        Ok(())
    }

    /// Increments the compaction counter and marks the graph `Stale`: an incremental
    /// removal invalidates the persisted index without recomputing it.
    pub async fn mark_node_removed(db: &SurrealDbClient, id: &str) -> Result<u32, AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let count = current.map(|c| c.removed_since_compaction + 1).unwrap_or(1);
        let _: Option<Self> = db
            .client
            .update(("context_graph", id))
            .patch(PatchOp::replace("/removed_since_compaction", count))
            .patch(PatchOp::replace("/state", "Stale"))
            .await?;
        Ok(count)
    }

    /// Appends a node id after an incremental `AddNode` and marks the graph `Stale`: the
    /// persisted index reflects the new node's edges but hasn't been globally recomputed.
    pub async fn append_node(
        db: &SurrealDbClient,
        id: &str,
        node_id: &str,
    ) -> Result<(), AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let mut node_ids = current.map(|c| c.node_ids).unwrap_or_default();
        node_ids.push(node_id.to_string());
        let _: Option<Self> = db
            .client
            .update(("context_graph", id))
            .patch(PatchOp::replace("/node_ids", node_ids))
            .patch(PatchOp::replace("/state", "Stale"))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_scope_is_first_class() {
        assert_eq!(scope_key("u1", None), "u1:personal");
        assert_eq!(scope_key("u1", Some("p1")), "u1:p1");
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let first = ContextGraph::get_or_create(&db, "u1", None).await.unwrap();
        let second = ContextGraph::get_or_create(&db, "u1", None).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn commit_build_bumps_version() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let graph = ContextGraph::get_or_create(&db, "u1", None).await.unwrap();
        ContextGraph::commit_build(&db, &graph.id, vec!["n1".to_string()], "Ready")
            .await
            .unwrap();
        let updated: ContextGraph = db.get_item(&graph.id).await.unwrap().unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.state, "Ready");
    }
}
