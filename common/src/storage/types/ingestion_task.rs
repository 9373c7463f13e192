use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

stored_object!(IngestionTask, "ingestion_task", {
    document_id: String,
    workspace_id: String,
    status: TaskStatus,
    progress: u8,
    message: String,
    cancel_requested: bool,
    worker_id: Option<String>,
    attempts: u32
});

impl IngestionTask {
    pub fn new(document_id: String, workspace_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            workspace_id,
            status: TaskStatus::Pending,
            progress: 0,
            message: "queued".to_string(),
            cancel_requested: false,
            worker_id: None,
            attempts: 0,
        }
    }

    /// Enqueues an ingestion task for a document unless one is already in
    /// flight. Returns the task actually in the queue either way.
    pub async fn enqueue(
        document_id: &str,
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        if let Some(active) = Self::find_active_for_document(document_id, db).await? {
            return Ok(active);
        }

        let task = Self::new(document_id.to_string(), workspace_id.to_string());
        let stored = db.store_item(task).await?;
        stored.ok_or_else(|| AppError::InternalError("Task insert returned nothing".into()))
    }

    /// The pending or processing task for a document, if any.
    pub async fn find_active_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let tasks: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE document_id = $document_id AND (status = 'pending' OR status = 'processing') \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(tasks.into_iter().next())
    }

    /// Latest task for a document regardless of state, for progress streams.
    pub async fn latest_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let tasks: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE document_id = $document_id \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(tasks.into_iter().next())
    }

    /// Atomically claims the oldest pending task for this worker. The whole
    /// select-and-update runs in one transaction so concurrent workers never
    /// claim the same task.
    pub async fn claim_next_pending(
        worker_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "LET $next = (SELECT id, created_at FROM {table} WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1)[0].id;",
                table = Self::table_name(),
            ))
            .query(
                "UPDATE $next SET \
                    status = 'processing', \
                    worker_id = $worker_id, \
                    attempts += 1, \
                    message = 'processing', \
                    updated_at = time::now() \
                 WHERE status = 'pending' RETURN AFTER;",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("worker_id", worker_id.to_string()))
            .await?;

        let claimed: Vec<Self> = response.take(1).unwrap_or_default();
        Ok(claimed.into_iter().next())
    }

    /// Persists the latest progress event. Progress is monotonic per task by
    /// construction of the pipeline phases.
    pub async fn update_progress(
        id: &str,
        status: TaskStatus,
        progress: u8,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET \
                status = $status, progress = $progress, message = $message, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .bind(("status", status))
        .bind(("progress", progress))
        .bind(("message", message.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    /// Flips the cooperative cancellation flag. The worker observes it
    /// between pipeline phases.
    pub async fn request_cancel(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET cancel_requested = true, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn is_cancel_requested(id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let task: Option<Self> = db.get_item(id).await?;
        Ok(task.is_some_and(|t| t.cancel_requested))
    }

    pub async fn delete_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query("DELETE type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}
