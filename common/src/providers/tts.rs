use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, Voice},
    Client,
};
use bytes::Bytes;

use crate::error::AppError;

use super::{with_retry, with_timeout};

/// Voice metadata surfaced to the UI for speaker selection.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: &'static str,
}

/// The OpenAI speech voices. Kept static: the provider has no listing API.
pub const VOICES: &[VoiceInfo] = &[
    VoiceInfo { id: "alloy", name: "Alloy", gender: "neutral" },
    VoiceInfo { id: "echo", name: "Echo", gender: "male" },
    VoiceInfo { id: "fable", name: "Fable", gender: "male" },
    VoiceInfo { id: "onyx", name: "Onyx", gender: "male" },
    VoiceInfo { id: "nova", name: "Nova", gender: "female" },
    VoiceInfo { id: "shimmer", name: "Shimmer", gender: "female" },
];

pub fn list_voices() -> &'static [VoiceInfo] {
    VOICES
}

pub fn voice_info(id: &str) -> Option<&'static VoiceInfo> {
    VOICES.iter().find(|voice| voice.id == id)
}

fn parse_voice(id: &str) -> Result<Voice, AppError> {
    match id {
        "alloy" => Ok(Voice::Alloy),
        "echo" => Ok(Voice::Echo),
        "fable" => Ok(Voice::Fable),
        "onyx" => Ok(Voice::Onyx),
        "nova" => Ok(Voice::Nova),
        "shimmer" => Ok(Voice::Shimmer),
        other => Err(AppError::Validation(format!("Unknown voice '{other}'"))),
    }
}

/// Speech synthesis adapter. Produces MP3 segment bytes per call.
pub struct TtsProvider {
    client: Client<OpenAIConfig>,
}

impl TtsProvider {
    pub fn openai(api_key: &str, base_url: &str) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
        );
        Self { client }
    }

    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, AppError> {
        let voice = parse_voice(voice_id)?;

        let response = with_retry(|| {
            let voice = voice.clone();
            let input = text.to_string();
            async move {
                with_timeout(async {
                    let request = CreateSpeechRequestArgs::default()
                        .model(SpeechModel::Tts1)
                        .voice(voice)
                        .input(input)
                        .build()?;
                    self.client
                        .audio()
                        .speech(request)
                        .await
                        .map_err(AppError::from)
                })
                .await
            }
        })
        .await?;

        Ok(response.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_voice_parses() {
        for voice in list_voices() {
            assert!(parse_voice(voice.id).is_ok(), "voice {} should parse", voice.id);
        }
    }

    #[test]
    fn unknown_voice_is_a_validation_error() {
        let result = parse_voice("darth_vader");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn voice_info_lookup() {
        let nova = voice_info("nova").expect("nova exists");
        assert_eq!(nova.name, "Nova");
        assert_eq!(nova.gender, "female");
        assert!(voice_info("missing").is_none());
    }
}
