use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::AppError;

use super::{with_retry, with_timeout};

/// Attempts at getting schema-conforming output before giving up.
const SCHEMA_ATTEMPTS: u32 = 3;

/// Completion adapter over any OpenAI-compatible endpoint. Ollama is reached
/// through its `/v1` compatibility surface with the same client.
pub struct LlmProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmProvider {
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
        // Ollama ignores the key but the client requires one
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

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages([
            ChatCompletionRequestSystemMessage::from(system).into(),
            ChatCompletionRequestUserMessage::from(user).into(),
        ]);
        if let Some(temperature) = temperature {
            args.temperature(temperature);
        }
        if let Some(format) = response_format {
            args.response_format(format);
        }
        Ok(args.build()?)
    }

    async fn execute(&self, request: CreateChatCompletionRequest) -> Result<String, AppError> {
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
            .ok_or_else(|| AppError::Generation("No content found in LLM response".into()))
    }

    /// Free-form completion.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<String, AppError> {
        let request = self.build_request(system, user, temperature, None)?;
        self.execute(request).await
    }

    /// Structured completion constrained by a JSON schema. The response must
    /// parse into `T` and pass `validate`; failures are retried twice with
    /// fresh completions before raising a generation error.
    pub async fn complete_structured<T, V>(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
        validate: V,
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        V: Fn(&T) -> Result<(), String>,
    {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: schema_name.into(),
                schema: Some(schema),
                strict: Some(true),
            },
        };

        let mut last_failure = String::new();
        for attempt in 1..=SCHEMA_ATTEMPTS {
            let request =
                self.build_request(system, user, None, Some(response_format.clone()))?;
            let content = self.execute(request).await?;

            match serde_json::from_str::<T>(&content) {
                Ok(value) => match validate(&value) {
                    Ok(()) => return Ok(value),
                    Err(reason) => {
                        warn!(schema = schema_name, attempt, reason, "LLM output failed validation");
                        last_failure = reason;
                    }
                },
                Err(err) => {
                    warn!(schema = schema_name, attempt, error = %err, "LLM output failed to parse");
                    last_failure = err.to_string();
                }
            }
        }

        Err(AppError::Generation(format!(
            "LLM failed to produce valid '{schema_name}' output after {SCHEMA_ATTEMPTS} attempts: {last_failure}"
        )))
    }
}
