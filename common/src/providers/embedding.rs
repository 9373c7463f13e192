use std::sync::{Arc, Mutex};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use fastembed::{InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::AppError;

use super::{with_retry, with_timeout};

/// Inputs per embedding request.
pub const EMBED_BATCH_SIZE: usize = 64;

enum Backend {
    OpenAi { client: Client<OpenAIConfig> },
    FastEmbed { model: Arc<Mutex<TextEmbedding>> },
    /// Deterministic content-hash vectors; test-only backend so the suite
    /// never touches the network or model files.
    Hashed,
}

/// Embedding adapter. The dimension is fixed per `(provider, model)` pair and
/// known at construction time, which is what the compatibility fingerprint
/// relies on.
pub struct EmbeddingProvider {
    provider: String,
    model: String,
    dimension: usize,
    backend: Backend,
}

impl EmbeddingProvider {
    pub fn openai(api_key: &str, base_url: &str, model: &str) -> Result<Self, AppError> {
        let dimension = openai_model_dimension(model)
            .ok_or_else(|| AppError::Configuration("embedding_model".into()))?;

        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
        );

        Ok(Self {
            provider: "openai".to_string(),
            model: model.to_string(),
            dimension,
            backend: Backend::OpenAi { client },
        })
    }

    /// Resolves a local fastembed model by name. Model files download on
    /// first use; initialization is blocking and runs off the async executor.
    pub async fn huggingface(model: &str) -> Result<Self, AppError> {
        let requested = model.to_ascii_lowercase();
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| info.model_code.to_ascii_lowercase().contains(&requested))
            .ok_or_else(|| AppError::Configuration("embedding_model".into()))?;

        let dimension = info.dim;
        let model_name = model.to_string();
        let embedding_model = info.model;
        let text_embedding = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(InitOptions::new(embedding_model))
        })
        .await?
        .map_err(|err| AppError::Processing(format!("Failed to load embedding model: {err}")))?;

        info!(model = %model_name, dimension, "Local embedding model ready");

        Ok(Self {
            provider: "huggingface".to_string(),
            model: model_name,
            dimension,
            backend: Backend::FastEmbed {
                model: Arc::new(Mutex::new(text_embedding)),
            },
        })
    }

    pub fn hashed(dimension: usize) -> Self {
        Self {
            provider: "hashed".to_string(),
            model: format!("hashed-{dimension}"),
            dimension,
            backend: Backend::Hashed,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn fingerprint(&self) -> (String, String) {
        (self.provider.clone(), self.model.clone())
    }

    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::InternalError("No embedding data received".into()))
    }

    /// Embeds all inputs, batching requests at `EMBED_BATCH_SIZE`.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut all = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(EMBED_BATCH_SIZE) {
            let vectors = match &self.backend {
                Backend::OpenAi { client } => self.embed_openai(client, batch).await?,
                Backend::FastEmbed { model } => Self::embed_fastembed(model, batch).await?,
                Backend::Hashed => batch
                    .iter()
                    .map(|text| hashed_vector(text, self.dimension))
                    .collect(),
            };

            for vector in &vectors {
                if vector.len() != self.dimension {
                    return Err(AppError::InternalError(format!(
                        "Embedding dimension mismatch: got {}, expected {}",
                        vector.len(),
                        self.dimension
                    )));
                }
            }
            all.extend(vectors);
        }
        Ok(all)
    }

    async fn embed_openai(
        &self,
        client: &Client<OpenAIConfig>,
        batch: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let response = with_retry(|| {
            let inputs = batch.to_vec();
            async move {
                with_timeout(async {
                    let request = CreateEmbeddingRequestArgs::default()
                        .model(&self.model)
                        .input(inputs)
                        .build()?;
                    client.embeddings().create(request).await.map_err(AppError::from)
                })
                .await
            }
        })
        .await?;

        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }

    async fn embed_fastembed(
        model: &Arc<Mutex<TextEmbedding>>,
        batch: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let model = Arc::clone(model);
        let inputs = batch.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| AppError::InternalError("Embedding model lock poisoned".into()))?;
            model
                .embed(inputs, None)
                .map_err(|err| AppError::Processing(format!("Embedding failed: {err}")))
        })
        .await?
    }
}

fn openai_model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Deterministic pseudo-embedding: expand a SHA-256 of the text into the
/// requested dimension and L2-normalize.
fn hashed_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for byte in digest {
            if values.len() == dimension {
                break;
            }
            values.push((f32::from(byte) - 127.5) / 127.5);
        }
        counter = counter.wrapping_add(1);
    }

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut values {
            *value /= norm;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_dimensions_are_known() {
        assert_eq!(openai_model_dimension("text-embedding-3-small"), Some(1536));
        assert_eq!(openai_model_dimension("text-embedding-3-large"), Some(3072));
        assert_eq!(openai_model_dimension("made-up-model"), None);
    }

    #[test]
    fn openai_rejects_unknown_model() {
        let result = EmbeddingProvider::openai("sk-test", "https://example.com/v1", "nope");
        assert!(matches!(result, Err(AppError::Configuration(field)) if field == "embedding_model"));
    }

    #[tokio::test]
    async fn hashed_embeddings_are_deterministic_and_normalized() {
        let provider = EmbeddingProvider::hashed(384);
        assert_eq!(provider.dimension(), 384);

        let first = provider.embed("photosynthesis").await.expect("embed");
        let second = provider.embed("photosynthesis").await.expect("embed");
        let other = provider.embed("mitochondria").await.expect("embed");

        assert_eq!(first.len(), 384);
        assert_eq!(first, second);
        assert_ne!(first, other);

        let norm = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn embed_batch_preserves_input_order() {
        let provider = EmbeddingProvider::hashed(16);
        let inputs: Vec<String> = (0..130).map(|i| format!("text {i}")).collect();

        let vectors = provider.embed_batch(&inputs).await.expect("embed batch");
        assert_eq!(vectors.len(), inputs.len());

        // Spot-check batching didn't shuffle anything across the 64-boundary
        let direct = provider.embed(&inputs[70]).await.expect("embed");
        assert_eq!(vectors[70], direct);
    }
}
