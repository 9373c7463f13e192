use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Workspace, "workspace", {
    name: String,
    llm_provider: Option<String>,
    llm_model: Option<String>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>
});

impl Workspace {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            llm_provider: None,
            llm_model: None,
            embedding_provider: None,
            embedding_model: None,
        }
    }

    pub async fn get_required(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        let workspace: Option<Self> = db.get_item(id).await?;
        workspace.ok_or_else(|| AppError::NotFound(format!("Workspace {id} not found")))
    }

    pub async fn list_all(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let workspaces: Vec<Self> = db
            .query("SELECT * FROM type::table($table) ORDER BY created_at ASC")
            .bind(("table", Self::table_name()))
            .await?
            .take(0)?;
        Ok(workspaces)
    }

    /// Applies the patchable fields and persists. `None` values leave the
    /// current value in place; overrides are cleared by setting the empty string.
    pub async fn apply_update(
        mut self,
        update: WorkspaceUpdate,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Workspace name may not be empty".into()));
            }
            self.name = name;
        }
        apply_override(&mut self.llm_provider, update.llm_provider);
        apply_override(&mut self.llm_model, update.llm_model);
        apply_override(&mut self.embedding_provider, update.embedding_provider);
        apply_override(&mut self.embedding_model, update.embedding_model);
        self.updated_at = Utc::now();

        let id = self.id.clone();
        let updated: Option<Self> = db
            .update((Self::table_name(), id))
            .content(self)
            .await?;
        updated.ok_or_else(|| AppError::InternalError("Workspace update returned nothing".into()))
    }
}

fn apply_override(slot: &mut Option<String>, value: Option<String>) {
    match value {
        None => {}
        Some(v) if v.is_empty() => *slot = None,
        Some(v) => *slot = Some(v),
    }
}

/// Patch payload for `PATCH /workspaces/{id}`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn create_and_list_workspaces() {
        let db = memory_db().await;

        let first = Workspace::new("Biology".into());
        let second = Workspace::new("History".into());
        db.store_item(first.clone()).await.expect("store first");
        db.store_item(second.clone()).await.expect("store second");

        let all = Workspace::list_all(&db).await.expect("list");
        assert_eq!(all.len(), 2);

        let fetched = Workspace::get_required(&first.id, &db).await.expect("get");
        assert_eq!(fetched.name, "Biology");
        assert!(fetched.embedding_provider.is_none());
    }

    #[tokio::test]
    async fn get_required_missing_workspace() {
        let db = memory_db().await;
        let result = Workspace::get_required("missing", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_sets_and_clears_overrides() {
        let db = memory_db().await;
        let workspace = Workspace::new("Chemistry".into());
        db.store_item(workspace.clone()).await.expect("store");

        let updated = workspace
            .apply_update(
                WorkspaceUpdate {
                    embedding_provider: Some("huggingface".into()),
                    embedding_model: Some("all-MiniLM-L6-v2".into()),
                    ..Default::default()
                },
                &db,
            )
            .await
            .expect("update");
        assert_eq!(updated.embedding_provider.as_deref(), Some("huggingface"));

        let cleared = updated
            .apply_update(
                WorkspaceUpdate {
                    embedding_provider: Some(String::new()),
                    ..Default::default()
                },
                &db,
            )
            .await
            .expect("clear");
        assert!(cleared.embedding_provider.is_none());
        // Model override untouched by the provider clear
        assert_eq!(cleared.embedding_model.as_deref(), Some("all-MiniLM-L6-v2"));
    }

    #[tokio::test]
    async fn update_rejects_empty_name() {
        let db = memory_db().await;
        let workspace = Workspace::new("Physics".into());
        db.store_item(workspace.clone()).await.expect("store");

        let result = workspace
            .apply_update(
                WorkspaceUpdate {
                    name: Some("   ".into()),
                    ..Default::default()
                },
                &db,
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
