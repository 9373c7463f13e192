use axum::{response::IntoResponse, Json};
use common::providers::tts::list_voices;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<&'static str>,
    pub voices_info: Vec<common::providers::tts::VoiceInfo>,
}

/// `GET /tts/voices`: the available speaker voices with display metadata.
pub async fn get_voices() -> Result<impl IntoResponse, ApiError> {
    let info = list_voices();
    Ok(Json(VoicesResponse {
        voices: info.iter().map(|voice| voice.id).collect(),
        voices_info: info.to_vec(),
    }))
}
