use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Lesson,
    Flashcards,
    Quiz,
    Mindmap,
    PodcastScript,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Flashcards => "flashcards",
            Self::Quiz => "quiz",
            Self::Mindmap => "mindmap",
            Self::PodcastScript => "podcast_script",
        }
    }
}

stored_object!(Artifact, "artifact", {
    workspace_id: String,
    topic: String,
    kind: ArtifactKind,
    payload: serde_json::Value
});

impl Artifact {
    pub fn new(
        workspace_id: String,
        topic: String,
        kind: ArtifactKind,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            topic,
            kind,
            payload,
        }
    }

    pub async fn get_by_key(
        workspace_id: &str,
        topic: &str,
        kind: ArtifactKind,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let found: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id AND topic = $topic AND kind = $kind \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .bind(("topic", topic.to_string()))
            .bind(("kind", kind))
            .await?
            .take(0)?;
        Ok(found.into_iter().next())
    }

    /// Replace-or-create keyed by `(workspace_id, topic, kind)`.
    ///
    /// Podcast scripts are versioned through `PodcastVersion` and always get a
    /// fresh row; every other kind keeps exactly one cached payload per key.
    pub async fn upsert(
        workspace_id: &str,
        topic: &str,
        kind: ArtifactKind,
        payload: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        if kind == ArtifactKind::PodcastScript {
            let artifact = Self::new(workspace_id.to_string(), topic.to_string(), kind, payload);
            let stored = db.store_item(artifact).await?;
            return stored
                .ok_or_else(|| AppError::InternalError("Artifact insert returned nothing".into()));
        }

        if let Some(existing) = Self::get_by_key(workspace_id, topic, kind, db).await? {
            let updated: Option<Self> = db
                .query(
                    "UPDATE type::thing($table, $id) SET payload = $payload, updated_at = time::now() RETURN AFTER",
                )
                .bind(("table", Self::table_name()))
                .bind(("id", existing.id.clone()))
                .bind(("payload", payload))
                .await?
                .take(0)?;
            return updated
                .ok_or_else(|| AppError::InternalError("Artifact update returned nothing".into()));
        }

        let artifact = Self::new(workspace_id.to_string(), topic.to_string(), kind, payload);
        let stored = db.store_item(artifact).await?;
        stored.ok_or_else(|| AppError::InternalError("Artifact insert returned nothing".into()))
    }

    /// All cached artifacts for a `(workspace, topic)` pair in one query.
    pub async fn get_existing(
        workspace_id: &str,
        topic: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let artifacts: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id AND topic = $topic \
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .bind(("topic", topic.to_string()))
            .await?
            .take(0)?;
        Ok(artifacts)
    }

    pub async fn delete_by_workspace(
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query("DELETE type::table($table) WHERE workspace_id = $workspace_id")
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}
