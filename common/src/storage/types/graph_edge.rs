use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Relationship classification between two nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Similar,
    Implements,
    DependsOn,
    References,
    ParentOf,
    SiblingOf,
}

stored_object!(GraphEdge, "graph_edge", {
    scope_key: String,
    source_id: String,
    target_id: String,
    kind: EdgeKind,
    weight: f32,
    rationale: Option<String>
});

impl GraphEdge {
    /// Builds a scope-partitioned identifier so edges for different owners never collide
    /// in a shared `graph_edge` table, mirroring `ContextGraph::scope_key`.
    pub fn new(
        scope_key: String,
        source_id: String,
        target_id: String,
        kind: EdgeKind,
        weight: f32,
        rationale: Option<String>,
    ) -> Result<Self, AppError> {
        if source_id == target_id {
            return Err(AppError::InvalidInput(
                "graph edges may not be self-loops".to_string(),
            ));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            scope_key,
            source_id,
            target_id,
            kind,
            weight,
            rationale,
        })
    }

    /// All edges whose `source_id` or `target_id` touches `node_id` within `scope_key`.
    pub async fn incident_to(
        db: &SurrealDbClient,
        scope_key: &str,
        node_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut result = db
            .client
            .query(
                "SELECT * FROM graph_edge WHERE scope_key = $scope \
                 AND (source_id = $node OR target_id = $node)",
            )
            .bind(("scope", scope_key.to_string()))
            .bind(("node", node_id.to_string()))
            .await?;
        Ok(result.take(0)?)
    }

    /// All edges for a scope, used for graph snapshots and BFS expansion.
    pub async fn for_scope(db: &SurrealDbClient, scope_key: &str) -> Result<Vec<Self>, AppError> {
        let mut result = db
            .client
            .query("SELECT * FROM graph_edge WHERE scope_key = $scope")
            .bind(("scope", scope_key.to_string()))
            .await?;
        Ok(result.take(0)?)
    }

    /// Deletes every edge touching `node_id`; used when a node is removed from its graph.
    pub async fn delete_incident(
        db: &SurrealDbClient,
        scope_key: &str,
        node_id: &str,
    ) -> Result<u64, AppError> {
        let mut result = db
            .client
            .query(
                "DELETE FROM graph_edge WHERE scope_key = $scope \
                 AND (source_id = $node OR target_id = $node) RETURN BEFORE",
            )
            .bind(("scope", scope_key.to_string()))
            .bind(("node", node_id.to_string()))
            .await?;
        let deleted: Vec<Self> = result.take(0)?;
        Ok(deleted.len() as u64)
    }

    pub async fn store_many(db: &SurrealDbClient, edges: Vec<Self>) -> Result<(), AppError> {
        for edge in edges {
            db.store_item(edge).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_self_loops() {
        let err = GraphEdge::new(
            "scope".to_string(),
            "n1".to_string(),
            "n1".to_string(),
            EdgeKind::Similar,
            0.9,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn incident_to_finds_both_directions() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let e1 = GraphEdge::new(
            "scope".to_string(),
            "a".to_string(),
            "b".to_string(),
            EdgeKind::Similar,
            0.8,
            None,
        )
        .unwrap();
        let e2 = GraphEdge::new(
            "scope".to_string(),
            "c".to_string(),
            "a".to_string(),
            EdgeKind::SiblingOf,
            0.5,
            None,
        )
        .unwrap();
        GraphEdge::store_many(&db, vec![e1, e2]).await.unwrap();

        let incident = GraphEdge::incident_to(&db, "scope", "a").await.unwrap();
        assert_eq!(incident.len(), 2);
    }
}
