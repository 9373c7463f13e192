use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::{
    artifact::{Artifact, ArtifactKind},
    podcast_version::PodcastType,
};
use generation_pipeline::{generators, podcast};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub workspace_id: String,
    pub topic: String,
}

/// `POST /generate/{lesson|flashcards|quiz|mindmap}`: the per-kind
/// generators share the retrieval + structured-output template.
pub async fn generate_artifact(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Json(params): Json<GenerateParams>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = match kind.as_str() {
        "lesson" => {
            generators::generate_lesson(&state.db, &state.settings, &params.workspace_id, &params.topic)
                .await?
        }
        "flashcards" => {
            generators::generate_flashcards(
                &state.db,
                &state.settings,
                &params.workspace_id,
                &params.topic,
            )
            .await?
        }
        "quiz" => {
            generators::generate_quiz(&state.db, &state.settings, &params.workspace_id, &params.topic)
                .await?
        }
        "mindmap" => {
            generators::generate_mindmap(&state.db, &state.settings, &params.workspace_id, &params.topic)
                .await?
        }
        other => {
            return Err(ApiError::Validation(format!(
                "Unknown artifact kind '{other}'; expected lesson, flashcards, quiz or mindmap"
            )))
        }
    };

    Ok(Json(artifact))
}

#[derive(Debug, Deserialize)]
pub struct ExistingParams {
    pub workspace_id: String,
    pub topic: String,
}

/// `GET /generate/existing`: the cached artifacts for a `(workspace, topic)`
/// pair, keyed by kind. Podcast scripts surface under `podcast`.
pub async fn get_existing(
    State(state): State<ApiState>,
    Query(params): Query<ExistingParams>,
) -> Result<impl IntoResponse, ApiError> {
    let artifacts = Artifact::get_existing(&params.workspace_id, &params.topic, &state.db).await?;

    let mut by_kind: HashMap<&'static str, serde_json::Value> = HashMap::new();
    for artifact in artifacts {
        let key = match artifact.kind {
            ArtifactKind::Lesson => "lesson",
            ArtifactKind::Flashcards => "flashcards",
            ArtifactKind::Quiz => "quiz",
            ArtifactKind::Mindmap => "mindmap",
            ArtifactKind::PodcastScript => "podcast",
        };
        // get_existing returns oldest-first; later entries (newest) win
        by_kind.insert(key, serde_json::to_value(&artifact).unwrap_or_default());
    }

    Ok(Json(by_kind))
}

#[derive(Debug, Deserialize)]
pub struct PodcastTypeParams {
    #[serde(rename = "type")]
    pub podcast_type: String,
}

#[derive(Debug, Deserialize)]
pub struct PodcastParams {
    pub workspace_id: String,
    pub topic: String,
    pub voice_a: String,
    pub voice_b: Option<String>,
}

fn parse_podcast_type(raw: &str) -> Result<PodcastType, ApiError> {
    match raw {
        "single" => Ok(PodcastType::Single),
        "duo" => Ok(PodcastType::Duo),
        other => Err(ApiError::Validation(format!(
            "Unknown podcast type '{other}'; expected single or duo"
        ))),
    }
}

/// `POST /generate/podcast?type=`: generates the script, registers a new
/// version (LRU-bounded) and kicks synthesis off in the background. The stub
/// returns immediately; progress streams via SSE on the version id.
pub async fn generate_podcast(
    State(state): State<ApiState>,
    Query(type_params): Query<PodcastTypeParams>,
    Json(params): Json<PodcastParams>,
) -> Result<impl IntoResponse, ApiError> {
    let podcast_type = parse_podcast_type(&type_params.podcast_type)?;

    let version = podcast::create_podcast_version(
        &state.db,
        &state.settings,
        &params.workspace_id,
        &params.topic,
        podcast_type,
        &params.voice_a,
        params.voice_b.as_deref(),
        &state.storage,
    )
    .await?;

    tokio::spawn(podcast::run_synthesis(
        Arc::clone(&state.db),
        state.storage.clone(),
        state.settings.clone(),
        version.id.clone(),
    ));

    Ok((StatusCode::ACCEPTED, Json(version)))
}

/// `POST /generate/podcast/resynthesize?type=`: replaces the newest
/// version's audio in place with a new voice assignment.
pub async fn resynthesize_podcast(
    State(state): State<ApiState>,
    Query(type_params): Query<PodcastTypeParams>,
    Json(params): Json<PodcastParams>,
) -> Result<impl IntoResponse, ApiError> {
    let podcast_type = parse_podcast_type(&type_params.podcast_type)?;

    let version = podcast::prepare_resynthesis(
        &state.db,
        &params.workspace_id,
        &params.topic,
        podcast_type,
        &params.voice_a,
        params.voice_b.as_deref(),
    )
    .await?;

    tokio::spawn(podcast::run_synthesis(
        Arc::clone(&state.db),
        state.storage.clone(),
        state.settings.clone(),
        version.id.clone(),
    ));

    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct NarrationParams {
    pub text: String,
    pub voice: String,
}

/// `GET /generate/narration`: short synthesis for UI voice previews.
pub async fn narration_preview(
    State(state): State<ApiState>,
    Query(params): Query<NarrationParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.text.trim().is_empty() {
        return Err(ApiError::Validation("Text may not be empty".into()));
    }

    let effective = state.settings.effective(None).await;
    let tts = effective.build_tts()?;
    let audio = tts.synthesize(&params.text, &params.voice).await?;

    Ok(([(axum::http::header::CONTENT_TYPE, "audio/mpeg")], audio))
}
