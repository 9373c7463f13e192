use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::{
    error::AppError,
    storage::types::{
        document::{Document, DocumentStatus},
        ingestion_task::{IngestionTask, TaskStatus},
        text_chunk::TextChunk,
    },
};
use tracing::info;

use crate::{
    api_state::ApiState,
    error::ApiError,
    sse::{progress_stream, ProgressEvent, SseResponse},
};

pub async fn get_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_required(&id, &state.db).await?;
    Ok(Json(document))
}

/// Deletes a document, cascading its chunks. An in-flight ingestion task is
/// cancelled cooperatively; the worker cleans up whatever it wrote.
pub async fn delete_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_required(&id, &state.db).await?;

    if let Some(task) = IngestionTask::find_active_for_document(&id, &state.db).await? {
        IngestionTask::request_cancel(&task.id, &state.db).await?;
    }

    TextChunk::delete_by_document(&id, &state.db).await?;
    IngestionTask::delete_by_document(&id, &state.db).await?;
    state
        .storage
        .delete(&document.file_path)
        .await
        .map_err(AppError::from)?;
    state
        .db
        .delete_item::<Document>(&id)
        .await
        .map_err(AppError::from)?;

    info!(document_id = %id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Restarts ingestion from phase 1. Chunk deletion precedes insertion inside
/// the pipeline, so reprocessing is idempotent.
pub async fn reprocess_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_required(&id, &state.db).await?;

    Document::set_status(&document.id, DocumentStatus::Pending, &state.db).await?;
    let task = IngestionTask::enqueue(&document.id, &document.workspace_id, &state.db).await?;

    info!(document_id = %id, task_id = %task.id, "Reprocess requested");
    Ok(StatusCode::ACCEPTED)
}

/// SSE stream of the document's ingestion progress, replaying the latest
/// persisted event on (re)connect and ending at a terminal status.
pub async fn document_progress(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> SseResponse {
    let db = state.db;

    progress_stream(
        move || {
            let db = db.clone();
            let id = id.clone();
            async move {
                IngestionTask::latest_for_document(&id, &db)
                    .await
                    .ok()
                    .flatten()
                    .map(|task| ProgressEvent {
                        status: status_label(task.status).to_string(),
                        progress: task.progress,
                        message: task.message,
                    })
            }
        },
        |event| event.status == "completed" || event.status == "failed",
    )
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}
