use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::opt::PatchOp;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::context::{ContextType, NewContext};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IngestionTaskStatus {
    Queued,
    InProgress {
        attempts: u32,
        leased_until: DateTime<Utc>,
    },
    Succeeded,
    Failed(String),
}

stored_object!(IngestionTask, "ingestion_task", {
    user_id: String,
    context_id: String,
    status: IngestionTaskStatus
});

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_LEASE_SECS: i64 = 60;

impl IngestionTask {
    pub fn new(user_id: String, context_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            context_id,
            status: IngestionTaskStatus::Queued,
        }
    }

    pub async fn enqueue(
        db: &SurrealDbClient,
        user_id: String,
        context_id: String,
    ) -> Result<Self, AppError> {
        let task = Self::new(user_id, context_id);
        db.store_item(task.clone()).await?;
        Ok(task)
    }

    /// Atomically claims the oldest queued (or lease-expired) task, preventing two
    /// workers from processing the same context concurrently.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
        lease_seconds: i64,
    ) -> Result<Option<Self>, AppError> {
        let mut result = db
            .client
            .query(
                "SELECT * FROM ingestion_task \
                 WHERE status = 'Queued' \
                    OR (status.InProgress != NONE AND status.InProgress.leased_until < $now AND status.InProgress.attempts < $max_attempts) \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("now", now))
            .bind(("max_attempts", MAX_ATTEMPTS))
            .await?;
        let candidates: Vec<Self> = result.take(0)?;
        let Some(task) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let attempts = match &task.status {
            IngestionTaskStatus::InProgress { attempts, .. } => attempts + 1,
            _ => 1,
        };
        let leased_until = now + chrono::Duration::seconds(lease_seconds);
        let _: Option<Self> = db
            .client
            .update(("ingestion_task", task.id.as_str()))
            .patch(PatchOp::replace(
                "/status",
                IngestionTaskStatus::InProgress {
                    attempts,
                    leased_until,
                },
            ))
            .await?;

        Ok(Some(Self {
            status: IngestionTaskStatus::InProgress {
                attempts,
                leased_until,
            },
            ..task
        }))
    }

    pub async fn mark_succeeded(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        let _: Option<Self> = db
            .client
            .update(("ingestion_task", id))
            .patch(PatchOp::replace("/status", IngestionTaskStatus::Succeeded))
            .await?;
        Ok(())
    }

    /// Requeues a task after a transient failure by pushing its lease `delay_secs` into
    /// the future rather than marking it terminally failed. `claim_next_ready` treats an
    /// expired lease as ready again, so this is how "retry after a delay" is expressed
    /// without a separate scheduler.
    pub async fn requeue_with_delay(
        db: &SurrealDbClient,
        id: &str,
        attempts: u32,
        delay_secs: i64,
    ) -> Result<(), AppError> {
        let leased_until = Utc::now() + chrono::Duration::seconds(delay_secs);
        let _: Option<Self> = db
            .client
            .update(("ingestion_task", id))
            .patch(PatchOp::replace(
                "/status",
                IngestionTaskStatus::InProgress {
                    attempts,
                    leased_until,
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        db: &SurrealDbClient,
        id: &str,
        reason: String,
    ) -> Result<(), AppError> {
        let _: Option<Self> = db
            .client
            .update(("ingestion_task", id))
            .patch(PatchOp::replace(
                "/status",
                IngestionTaskStatus::Failed(reason),
            ))
            .await?;
        Ok(())
    }
}

/// Wire-shape mirror of [`NewContext`], which deliberately carries no `Serialize`/
/// `Deserialize` since it is a construction-time-only argument type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContextWire {
    pub title: String,
    pub content: String,
    pub context_type: ContextType,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<NewContextWire> for NewContext {
    fn from(wire: NewContextWire) -> Self {
        NewContext {
            title: wire.title,
            content: wire.content,
            context_type: wire.context_type,
            project_id: wire.project_id,
            tags: wire.tags,
            source: None,
            metadata: wire.metadata,
        }
    }
}
