use axum::{
    extract::State,
    http::StatusCode,
    response::{sse::Event, IntoResponse},
    Json,
};
use common::{
    providers::embedding::EmbeddingProvider,
    storage::types::system_settings::{SystemSettings, SystemSettingsUpdate},
    utils::runtime::RuntimeInfo,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    api_state::ApiState,
    error::ApiError,
    sse::{error_stream, sse_with_keep_alive, EventStream, ProgressEvent, SseResponse},
};

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: SystemSettings,
    pub runtime_info: RuntimeInfo,
}

/// The API key is write-only: reads redact it down to presence.
fn redacted(mut settings: SystemSettings) -> SystemSettings {
    if settings.openai_api_key.is_some() {
        settings.openai_api_key = Some("********".to_string());
    }
    settings
}

pub async fn get_settings(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let settings = state.settings.current().await;
    Ok(Json(SettingsResponse {
        settings: redacted(settings),
        runtime_info: RuntimeInfo::probe(),
    }))
}

pub async fn update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SystemSettingsUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.settings.update(update).await?;
    Ok(Json(SettingsResponse {
        settings: redacted(updated),
        runtime_info: RuntimeInfo::probe(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadModelParams {
    pub provider: String,
    pub model_name: String,
    pub ollama_base_url: Option<String>,
}

/// `POST /settings/download-model`: streams download/pull progress events.
/// Ollama pulls report byte-level progress from the NDJSON stream; local
/// fastembed downloads are coarse (start/complete). Both are cancellable.
pub async fn download_model(
    State(state): State<ApiState>,
    Json(params): Json<DownloadModelParams>,
) -> SseResponse {
    let token = state.downloads.begin().await;

    match params.provider.as_str() {
        "ollama" => {
            let base_url = match params.ollama_base_url {
                Some(url) if !url.is_empty() => url,
                _ => state.settings.current().await.ollama_base_url,
            };
            ollama_pull_stream(base_url, params.model_name, token)
        }
        "huggingface" => huggingface_download_stream(params.model_name, token),
        other => error_stream(format!(
            "Unknown provider '{other}'; expected ollama or huggingface"
        )),
    }
}

pub async fn cancel_download(State(state): State<ApiState>) -> impl IntoResponse {
    state.downloads.cancel().await;
    StatusCode::NO_CONTENT
}

fn progress_event(status: &str, progress: u8, message: impl Into<String>) -> Event {
    let event = ProgressEvent {
        status: status.to_string(),
        progress,
        message: message.into(),
    };
    match serde_json::to_string(&event) {
        Ok(payload) => Event::default().event("progress").data(payload),
        Err(err) => Event::default().event("error").data(err.to_string()),
    }
}

/// Streams an Ollama `/api/pull`, translating its NDJSON lines into progress
/// events. The pull API reports `{status, total?, completed?}` per layer.
fn ollama_pull_stream(base_url: String, model_name: String, token: CancellationToken) -> SseResponse {
    let stream: EventStream = async_stream::stream! {
        yield Ok(progress_event("downloading", 0, format!("pulling {model_name}")));

        let url = format!("{}/api/pull", base_url.trim_end_matches('/'));
        let client = reqwest::Client::new();
        let response = tokio::select! {
            () = token.cancelled() => {
                yield Ok(progress_event("error", 0, "download cancelled"));
                return;
            }
            result = client
                .post(&url)
                .json(&serde_json::json!({ "name": model_name, "stream": true }))
                .send() => result,
        };

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                yield Ok(progress_event("error", 0, format!("Ollama returned {}", response.status())));
                return;
            }
            Err(err) => {
                yield Ok(progress_event("error", 0, format!("Failed to reach Ollama: {err}")));
                return;
            }
        };

        let mut buffer = String::new();
        let mut bytes_stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                () = token.cancelled() => {
                    yield Ok(progress_event("error", 0, "download cancelled"));
                    return;
                }
                chunk = bytes_stream.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Ok(progress_event("error", 0, format!("Pull stream failed: {err}")));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => {
                        let status = value["status"].as_str().unwrap_or("pulling").to_string();
                        if let Some(error) = value["error"].as_str() {
                            yield Ok(progress_event("error", 0, error.to_string()));
                            return;
                        }
                        let progress = match (value["completed"].as_u64(), value["total"].as_u64()) {
                            (Some(completed), Some(total)) if total > 0 => {
                                ((completed as f64 / total as f64) * 100.0).floor() as u8
                            }
                            _ => 0,
                        };
                        yield Ok(progress_event("pulling", progress, status));
                    }
                    Err(err) => {
                        warn!(error = %err, "Unparseable Ollama pull line");
                    }
                }
            }
        }

        yield Ok(progress_event("completed", 100, format!("{model_name} ready")));
    }
    .boxed();

    sse_with_keep_alive(stream)
}

/// Initializes a fastembed model, which downloads its files on first use.
/// Progress is coarse: start, then completed or error.
fn huggingface_download_stream(model_name: String, token: CancellationToken) -> SseResponse {
    let stream: EventStream = async_stream::stream! {
        yield Ok(progress_event("downloading", 0, format!("downloading {model_name}")));

        let download = EmbeddingProvider::huggingface(&model_name);
        tokio::pin!(download);

        let result = tokio::select! {
            () = token.cancelled() => {
                yield Ok(progress_event("error", 0, "download cancelled"));
                return;
            }
            result = &mut download => result,
        };

        match result {
            Ok(provider) => {
                yield Ok(progress_event(
                    "completed",
                    100,
                    format!("{model_name} ready ({} dimensions)", provider.dimension()),
                ));
            }
            Err(err) => {
                yield Ok(progress_event("error", 0, err.to_string()));
            }
        }
    }
    .boxed();

    sse_with_keep_alive(stream)
}
