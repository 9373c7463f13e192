use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::chat_message::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub workspace_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

pub async fn chat(
    State(state): State<ApiState>,
    Json(params): Json<ChatParams>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = generation_pipeline::chat::chat(
        &state.db,
        &state.settings,
        &params.workspace_id,
        &params.message,
    )
    .await?;

    Ok(Json(ChatResponse { answer }))
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

pub async fn chat_history(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = ChatMessage::history(&workspace_id, &state.db).await?;
    let entries: Vec<HistoryEntry> = history
        .into_iter()
        .map(|message| HistoryEntry {
            role: message.role.to_string().to_lowercase(),
            content: message.content,
        })
        .collect();
    Ok(Json(entries))
}

pub async fn clear_chat_history(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ChatMessage::clear_workspace(&workspace_id, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
