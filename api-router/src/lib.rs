#![allow(clippy::missing_docs_in_private_items)]

use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    chat::{chat, chat_history, clear_chat_history},
    documents::{delete_document, document_progress, get_document, reprocess_document},
    files::{get_audio, get_upload},
    generate::{
        generate_artifact, generate_podcast, get_existing, narration_preview, resynthesize_podcast,
    },
    podcasts::{delete_version, get_version, list_versions, synthesis_progress},
    probes::{live, ready},
    settings::{cancel_download, download_model, get_settings, update_settings},
    tts::get_voices,
    workspaces::{
        create_workspace, delete_workspace, get_workspace, list_workspaces, update_workspace,
        upload_document,
    },
};

pub mod api_state;
pub mod error;
pub mod sse;
mod routes;

const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// The full JSON/SSE surface.
pub fn api_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        // Probes
        .route("/live", get(live))
        .route("/ready", get(ready))
        // Workspaces & documents
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/workspaces/{id}",
            get(get_workspace).patch(update_workspace).delete(delete_workspace),
        )
        .route(
            "/workspaces/{id}/upload",
            post(upload_document).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/documents/{id}/reprocess", post(reprocess_document))
        .route("/documents/{id}/progress", get(document_progress))
        // Chat
        .route("/chat", post(chat))
        .route(
            "/chat/history/{workspace_id}",
            get(chat_history).delete(clear_chat_history),
        )
        // Generation
        .route("/generate/existing", get(get_existing))
        .route("/generate/podcast", post(generate_podcast))
        .route("/generate/podcast/resynthesize", post(resynthesize_podcast))
        .route("/generate/narration", get(narration_preview))
        .route("/generate/{kind}", post(generate_artifact))
        // Podcasts
        .route("/podcasts/versions", get(list_versions))
        .route(
            "/podcasts/{version_id}",
            get(get_version).delete(delete_version),
        )
        .route(
            "/podcast/synthesis/progress/{version_id}",
            get(synthesis_progress),
        )
        // Settings & runtime
        .route("/settings", get(get_settings).post(update_settings))
        .route("/settings/download-model", post(download_model))
        .route("/settings/cancel-download", post(cancel_download))
        // Static assets
        .route("/files/{*path}", get(get_upload))
        .route("/audio/{filename}", get(get_audio))
        // TTS
        .route("/tts/voices", get(get_voices))
}
