use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::podcast_version::{
    PodcastType, PodcastVersion, SynthesisStatus, MAX_VERSIONS,
};
use serde::{Deserialize, Serialize};

use crate::{
    api_state::ApiState,
    error::ApiError,
    sse::{progress_stream, ProgressEvent, SseResponse},
};

#[derive(Debug, Deserialize)]
pub struct VersionsParams {
    pub workspace_id: String,
    pub topic: String,
    #[serde(rename = "type")]
    pub podcast_type: String,
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<PodcastVersion>,
    pub max_versions: usize,
}

pub async fn list_versions(
    State(state): State<ApiState>,
    Query(params): Query<VersionsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let podcast_type = match params.podcast_type.as_str() {
        "single" => PodcastType::Single,
        "duo" => PodcastType::Duo,
        other => {
            return Err(ApiError::Validation(format!(
                "Unknown podcast type '{other}'; expected single or duo"
            )))
        }
    };

    let versions = PodcastVersion::list_versions(
        &params.workspace_id,
        &params.topic,
        podcast_type,
        &state.db,
    )
    .await?;

    Ok(Json(VersionsResponse {
        versions,
        max_versions: MAX_VERSIONS,
    }))
}

pub async fn get_version(
    State(state): State<ApiState>,
    Path(version_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let version = PodcastVersion::get_required(&version_id, &state.db).await?;
    Ok(Json(version))
}

pub async fn delete_version(
    State(state): State<ApiState>,
    Path(version_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    PodcastVersion::delete_with_audio(&version_id, &state.db, &state.storage).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// SSE stream of synthesis progress for one version. The latest persisted
/// event is replayed immediately so reconnecting clients resynchronize.
pub async fn synthesis_progress(
    State(state): State<ApiState>,
    Path(version_id): Path<String>,
) -> SseResponse {
    let db = state.db;

    progress_stream(
        move || {
            let db = db.clone();
            let version_id = version_id.clone();
            async move {
                PodcastVersion::get_required(&version_id, &db)
                    .await
                    .ok()
                    .map(|version| ProgressEvent {
                        status: status_label(version.status).to_string(),
                        progress: version.progress,
                        message: version.message,
                    })
            }
        },
        |event| event.status == "complete" || event.status == "failed",
    )
}

fn status_label(status: SynthesisStatus) -> &'static str {
    match status {
        SynthesisStatus::Pending => "pending",
        SynthesisStatus::Synthesizing => "synthesizing",
        SynthesisStatus::Complete => "complete",
        SynthesisStatus::Failed => "failed",
    }
}
