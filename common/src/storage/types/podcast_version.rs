use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager},
    stored_object,
};

/// Retained versions per `(workspace, topic, type)`. The oldest is evicted
/// together with its audio file when the cap would be exceeded.
pub const MAX_VERSIONS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PodcastType {
    Single,
    Duo,
}

impl std::fmt::Display for PodcastType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Duo => write!(f, "duo"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStatus {
    Pending,
    Synthesizing,
    Complete,
    Failed,
}

stored_object!(PodcastVersion, "podcast_version", {
    workspace_id: String,
    topic: String,
    podcast_type: PodcastType,
    voice_a: String,
    voice_b: Option<String>,
    voice_a_name: String,
    voice_b_name: Option<String>,
    script_artifact_id: String,
    audio_path: Option<String>,
    status: SynthesisStatus,
    progress: u8,
    message: String
});

impl PodcastVersion {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: String,
        topic: String,
        podcast_type: PodcastType,
        voice_a: String,
        voice_b: Option<String>,
        voice_a_name: String,
        voice_b_name: Option<String>,
        script_artifact_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            topic,
            podcast_type,
            voice_a,
            voice_b,
            voice_a_name,
            voice_b_name,
            script_artifact_id,
            audio_path: None,
            status: SynthesisStatus::Pending,
            progress: 0,
            message: String::new(),
        }
    }

    pub async fn get_required(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        let version: Option<Self> = db.get_item(id).await?;
        version.ok_or_else(|| AppError::NotFound(format!("Podcast version {id} not found")))
    }

    /// Versions for a key, newest first.
    pub async fn list_versions(
        workspace_id: &str,
        topic: &str,
        podcast_type: PodcastType,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let versions: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id AND topic = $topic AND podcast_type = $podcast_type \
                 ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .bind(("topic", topic.to_string()))
            .bind(("podcast_type", podcast_type))
            .await?
            .take(0)?;
        Ok(versions)
    }

    /// Drops the oldest versions beyond `MAX_VERSIONS`, removing rows before
    /// audio files so a crash can only leak a file, never dangle a row.
    pub async fn enforce_version_cap(
        workspace_id: &str,
        topic: &str,
        podcast_type: PodcastType,
        db: &SurrealDbClient,
        storage: &StorageManager,
    ) -> Result<(), AppError> {
        let versions = Self::list_versions(workspace_id, topic, podcast_type, db).await?;
        for stale in versions.iter().skip(MAX_VERSIONS) {
            db.delete_item::<Self>(&stale.id).await?;
            if let Some(audio_path) = &stale.audio_path {
                storage.delete(audio_path).await?;
            }
        }
        Ok(())
    }

    /// Persists the latest synthesis progress event on the row. The SSE
    /// endpoint replays this state to reconnecting clients.
    pub async fn update_progress(
        id: &str,
        status: SynthesisStatus,
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

    pub async fn set_audio_path(
        id: &str,
        audio_path: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET audio_path = $audio_path, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .bind(("audio_path", audio_path.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn delete_with_audio(
        id: &str,
        db: &SurrealDbClient,
        storage: &StorageManager,
    ) -> Result<(), AppError> {
        let version = Self::get_required(id, db).await?;
        db.delete_item::<Self>(id).await?;
        if let Some(audio_path) = version.audio_path {
            storage.delete(&audio_path).await?;
        }
        Ok(())
    }

    pub async fn delete_by_workspace(
        workspace_id: &str,
        db: &SurrealDbClient,
        storage: &StorageManager,
    ) -> Result<(), AppError> {
        let versions: Vec<Self> = db
            .query("SELECT * FROM type::table($table) WHERE workspace_id = $workspace_id")
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .take(0)?;
        for version in versions {
            db.delete_item::<Self>(&version.id).await?;
            if let Some(audio_path) = version.audio_path {
                storage.delete(&audio_path).await?;
            }
        }
        Ok(())
    }

    /// All audio locations referenced by any version. Used by the startup
    /// sweep to delete orphaned files left behind by a crash mid-eviction.
    pub async fn referenced_audio_paths(db: &SurrealDbClient) -> Result<Vec<String>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            audio_path: String,
        }

        let rows: Vec<Row> = db
            .query("SELECT audio_path FROM type::table($table) WHERE audio_path != NONE")
            .bind(("table", Self::table_name()))
            .await?
            .take(0)?;
        Ok(rows.into_iter().map(|r| r.audio_path).collect())
    }
}
