use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use common::{
    error::AppError,
    storage::store::{StorageManager, UPLOADS_PREFIX},
};

use crate::{api_state::ApiState, error::ApiError};

fn reject_traversal(name: &str) -> Result<(), ApiError> {
    if name.contains("..") || name.starts_with('/') {
        return Err(ApiError::Validation("Invalid file name".into()));
    }
    Ok(())
}

async fn serve(state: &ApiState, location: String) -> Result<impl IntoResponse, ApiError> {
    let bytes = match state.storage.get(&location).await {
        Ok(bytes) => bytes,
        Err(object_store::Error::NotFound { .. }) => {
            return Err(ApiError::NotFound(format!("File {location} not found")))
        }
        Err(err) => return Err(ApiError::from(AppError::from(err))),
    };

    let content_type = mime_guess::from_path(&location)
        .first_or_octet_stream()
        .to_string();

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// `GET /files/{workspace_id}/{filename}`: uploaded document bytes.
/// Documents reference their file as `uploads/{workspace_id}/{filename}`.
pub async fn get_upload(
    State(state): State<ApiState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    reject_traversal(&path)?;
    serve(&state, format!("{UPLOADS_PREFIX}/{path}")).await
}

/// `GET /audio/{filename}`: synthesized podcast audio bytes.
pub async fn get_audio(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    reject_traversal(&filename)?;
    serve(&state, StorageManager::audio_location(&filename)).await
}
