use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        store::{StorageManager, UPLOADS_PREFIX},
        types::{
            artifact::Artifact,
            chat_message::ChatMessage,
            document::{Document, FileType},
            ingestion_task::IngestionTask,
            podcast_version::PodcastVersion,
            text_chunk::TextChunk,
            workspace::{Workspace, WorkspaceUpdate},
        },
    },
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;
use uuid::Uuid;

use crate::{api_state::ApiState, error::ApiError};

pub async fn list_workspaces(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let workspaces = Workspace::list_all(&state.db).await?;
    Ok(Json(workspaces))
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceParams {
    pub name: String,
}

pub async fn create_workspace(
    State(state): State<ApiState>,
    Json(params): Json<CreateWorkspaceParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.name.trim().is_empty() {
        return Err(ApiError::Validation("Workspace name may not be empty".into()));
    }

    let workspace = Workspace::new(params.name.trim().to_string());
    let stored = state
        .db
        .store_item(workspace)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| ApiError::Internal("Workspace insert returned nothing".into()))?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Workspace detail: the row, its documents, and the provider fields that
/// are effective for it after override resolution.
#[derive(Debug, Serialize)]
pub struct WorkspaceDetail {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub documents: Vec<Document>,
    pub effective_llm_provider: String,
    pub effective_llm_model: String,
    pub effective_embedding_provider: String,
    pub effective_embedding_model: String,
}

pub async fn get_workspace(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = Workspace::get_required(&id, &state.db).await?;
    let documents = Document::list_by_workspace(&id, &state.db).await?;
    let effective = state.settings.effective(Some(&workspace)).await;

    Ok(Json(WorkspaceDetail {
        workspace,
        documents,
        effective_llm_provider: effective.llm_provider,
        effective_llm_model: effective.llm_model,
        effective_embedding_provider: effective.embedding_provider,
        effective_embedding_model: effective.embedding_model,
    }))
}

pub async fn update_workspace(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<WorkspaceUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = Workspace::get_required(&id, &state.db).await?;
    let updated = workspace.apply_update(update, &state.db).await?;
    Ok(Json(updated))
}

/// Deletes a workspace and everything derived from it: documents, chunks,
/// chat history, artifacts, podcast versions with their audio, and uploaded
/// files. In-flight ingestion is cancelled cooperatively first.
pub async fn delete_workspace(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = Workspace::get_required(&id, &state.db).await?;

    let documents = Document::list_by_workspace(&id, &state.db).await?;
    for document in &documents {
        if let Some(task) = IngestionTask::find_active_for_document(&document.id, &state.db).await? {
            IngestionTask::request_cancel(&task.id, &state.db).await?;
        }
        TextChunk::delete_by_document(&document.id, &state.db).await?;
        IngestionTask::delete_by_document(&document.id, &state.db).await?;
        state
            .db
            .delete_item::<Document>(&document.id)
            .await
            .map_err(AppError::from)?;
    }

    ChatMessage::clear_workspace(&id, &state.db).await?;
    Artifact::delete_by_workspace(&id, &state.db).await?;
    PodcastVersion::delete_by_workspace(&id, &state.db, &state.storage).await?;
    state
        .storage
        .delete_prefix(&format!("{UPLOADS_PREFIX}/{id}"))
        .await
        .map_err(AppError::from)?;

    state
        .db
        .delete_item::<Workspace>(&workspace.id)
        .await
        .map_err(AppError::from)?;

    info!(workspace_id = %id, documents = documents.len(), "Workspace deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    #[form_data(limit = "52428800")] // 50 MB upload cap
    pub file: FieldData<NamedTempFile>,
}

/// Accepts a document upload, stores the file, inserts the pending document
/// row and enqueues ingestion. Failures after acceptance surface on the
/// document's status, never on this endpoint.
pub async fn upload_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = Workspace::get_required(&id, &state.db).await?;

    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .ok_or_else(|| ApiError::Validation("Uploaded file has no file name".into()))?;
    let content_type = input.file.metadata.content_type.clone().unwrap_or_default();

    let file_type = FileType::detect(&file_name, &content_type).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unsupported file type for '{file_name}'; accepted: pdf, docx, pptx, images"
        ))
    })?;

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::from)?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("Uploaded file is empty".into()));
    }

    // Prefix with a UUID so identically named uploads never collide
    let sanitized = sanitize_file_name(&file_name);
    let stored_name = format!("{}-{}", Uuid::new_v4(), sanitized);
    let location = StorageManager::upload_location(&workspace.id, &stored_name);
    state
        .storage
        .put(&location, Bytes::from(bytes))
        .await
        .map_err(AppError::from)?;

    let document = Document::new(workspace.id.clone(), file_name, file_type, location);
    let document = state
        .db
        .store_item(document)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| ApiError::Internal("Document insert returned nothing".into()))?;

    IngestionTask::enqueue(&document.id, &workspace.id, &state.db).await?;

    info!(document_id = %document.id, workspace_id = %workspace.id, "Document uploaded");
    Ok((StatusCode::CREATED, Json(document)))
}

/// Replaces anything outside `[A-Za-z0-9_.]` so names are path-safe.
fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_extension_and_replaces_separators() {
        assert_eq!(sanitize_file_name("my notes.pdf"), "my_notes.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("deck (v2).pptx"), "deck__v2_.pptx");
    }
}
