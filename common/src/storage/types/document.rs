use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Accepted source formats. Everything else is rejected at upload time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Pptx,
    Image,
}

impl FileType {
    /// Infers the type from the uploaded file name, falling back to the MIME type.
    pub fn detect(file_name: &str, mime_type: &str) -> Option<Self> {
        let extension = std::path::Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => return Some(Self::Pdf),
            Some("docx") => return Some(Self::Docx),
            Some("pptx") => return Some(Self::Pptx),
            Some("png" | "jpg" | "jpeg" | "webp" | "gif") => return Some(Self::Image),
            _ => {}
        }

        match mime_type {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Some(Self::Pptx)
            }
            m if m.starts_with("image/") => Some(Self::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Image => "image",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

stored_object!(Document, "document", {
    workspace_id: String,
    title: String,
    file_type: FileType,
    file_path: String,
    status: DocumentStatus,
    error_message: Option<String>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>
});

/// Distinct `(provider, model)` pair over a workspace's completed documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Fingerprint {
    pub embedding_provider: String,
    pub embedding_model: String,
}

impl Document {
    pub fn new(workspace_id: String, title: String, file_type: FileType, file_path: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            title,
            file_type,
            file_path,
            status: DocumentStatus::Pending,
            error_message: None,
            embedding_provider: None,
            embedding_model: None,
        }
    }

    pub async fn get_required(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        let document: Option<Self> = db.get_item(id).await?;
        document.ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
    }

    pub async fn list_by_workspace(
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let documents: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) WHERE workspace_id = $workspace_id ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .take(0)?;
        Ok(documents)
    }

    pub async fn set_status(
        id: &str,
        status: DocumentStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET status = $status, error_message = NONE, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .bind(("status", status))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn set_failed(
        id: &str,
        error_message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET status = 'failed', error_message = $message, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .bind(("message", error_message.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    /// Stamps the fingerprint and flips the document to completed. Called by
    /// the ingestion pipeline after the chunk transaction committed.
    pub async fn complete_with_fingerprint(
        id: &str,
        embedding_provider: &str,
        embedding_model: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) SET \
                status = 'completed', \
                error_message = NONE, \
                embedding_provider = $provider, \
                embedding_model = $model, \
                updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_string()))
        .bind(("provider", embedding_provider.to_string()))
        .bind(("model", embedding_model.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    /// Distinct embedding fingerprints across a workspace's completed
    /// documents, with the titles carrying each fingerprint. The retriever
    /// uses the titles to produce an actionable conflict message.
    pub async fn fingerprints(
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<(Fingerprint, Vec<String>)>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            title: String,
            embedding_provider: String,
            embedding_model: String,
        }

        let rows: Vec<Row> = db
            .query(
                "SELECT title, embedding_provider, embedding_model \
                 FROM type::table($table) \
                 WHERE workspace_id = $workspace_id \
                   AND status = 'completed' \
                   AND embedding_provider != NONE",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .take(0)?;

        let mut grouped: Vec<(Fingerprint, Vec<String>)> = Vec::new();
        for row in rows {
            let fingerprint = Fingerprint {
                embedding_provider: row.embedding_provider,
                embedding_model: row.embedding_model,
            };
            match grouped.iter_mut().find(|(fp, _)| *fp == fingerprint) {
                Some((_, titles)) => titles.push(row.title),
                None => grouped.push((fingerprint, vec![row.title])),
            }
        }
        Ok(grouped)
    }
}
