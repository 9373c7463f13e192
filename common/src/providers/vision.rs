use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use crate::error::AppError;

use super::{with_retry, with_timeout};

/// Substituted for a caption when a single image cannot be processed.
pub const UNREADABLE_IMAGE_PLACEHOLDER: &str = "[image: unreadable]";

const CAPTION_PROMPT: &str = "Describe the content of this image concisely and factually. \
If it contains text, a diagram, a chart or a table, transcribe the information it conveys.";

/// Caption adapter over a vision-capable chat model (OpenAI or Ollama's
/// OpenAI-compatible endpoint).
pub struct VisionProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl VisionProvider {
    pub fn openai(api_key: &str, base_url: &str, model: &str) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
        );
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn ollama(base_url: &str, model: &str) -> Self {
        let base = format!("{}/v1", base_url.trim_end_matches('/'));
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key("ollama")
                .with_api_base(base),
        );
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Captions one image. A failed caption degrades to the placeholder so a
    /// single bad image never fails a whole document.
    pub async fn caption(&self, image_bytes: &[u8], mime: &str) -> String {
        match self.try_caption(image_bytes, mime).await {
            Ok(caption) => caption,
            Err(err) => {
                warn!(error = %err, "Image caption failed, substituting placeholder");
                UNREADABLE_IMAGE_PLACEHOLDER.to_string()
            }
        }
    }

    async fn try_caption(&self, image_bytes: &[u8], mime: &str) -> Result<String, AppError> {
        let base64_image = STANDARD.encode(image_bytes);
        let image_url = format!("data:{mime};base64,{base64_image}");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(CAPTION_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(image_url)
                                .detail(ImageDetail::High)
                                .build()?,
                        )
                        .build()?
                        .into(),
                ])
                .build()?
                .into()])
            .build()?;

        let response = with_retry(|| {
            let request = request.clone();
            async move {
                with_timeout(async {
                    self.client
                        .chat()
                        .create(request)
                        .await
                        .map_err(AppError::from)
                })
                .await
            }
        })
        .await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|caption| !caption.trim().is_empty())
            .ok_or_else(|| AppError::Generation("No caption in vision response".into()))
    }
}
