use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::AppError,
    providers::{
        embedding::EmbeddingProvider, llm::LlmProvider, tts::TtsProvider, vision::VisionProvider,
    },
    storage::{
        db::SurrealDbClient,
        types::{
            system_settings::{SystemSettings, SystemSettingsUpdate},
            workspace::Workspace,
        },
    },
    utils::config::AppConfig,
};

/// The one piece of mutable cross-request state: the settings row cached
/// behind a read-write lock, loaded at startup and written through on update.
#[derive(Clone)]
pub struct SettingsHandle {
    db: Arc<SurrealDbClient>,
    openai_base_url: String,
    inner: Arc<RwLock<SystemSettings>>,
}

impl SettingsHandle {
    pub async fn initialize(db: Arc<SurrealDbClient>, config: &AppConfig) -> Result<Self, AppError> {
        let settings = SystemSettings::ensure_initialized(&db, config).await?;
        Ok(Self {
            db,
            openai_base_url: config.openai_base_url.clone(),
            inner: Arc::new(RwLock::new(settings)),
        })
    }

    pub async fn current(&self) -> SystemSettings {
        self.inner.read().await.clone()
    }

    /// Merges the partial update, persists it, then swaps the cache. Writers
    /// hold the exclusive lock across the DB write so readers never observe a
    /// cache ahead of or behind the store.
    pub async fn update(&self, update: SystemSettingsUpdate) -> Result<SystemSettings, AppError> {
        let mut guard = self.inner.write().await;
        let merged = guard.merged(update);
        let persisted = SystemSettings::update(&self.db, merged).await?;
        *guard = persisted.clone();
        info!(
            llm_provider = %persisted.llm_provider,
            embedding_provider = %persisted.embedding_provider,
            embedding_model = %persisted.embedding_model,
            "System settings updated"
        );
        Ok(persisted)
    }

    /// Resolves the effective configuration for an operation: workspace
    /// overrides merged over the global settings.
    pub async fn effective(&self, workspace: Option<&Workspace>) -> EffectiveConfig {
        let settings = self.inner.read().await;

        let llm_provider = workspace
            .and_then(|ws| ws.llm_provider.clone())
            .unwrap_or_else(|| settings.llm_provider.clone());
        let default_llm_model = if llm_provider == "ollama" {
            settings.ollama_model.clone()
        } else {
            settings.openai_model.clone()
        };
        let llm_model = workspace
            .and_then(|ws| ws.llm_model.clone())
            .unwrap_or(default_llm_model);

        let embedding_provider = workspace
            .and_then(|ws| ws.embedding_provider.clone())
            .unwrap_or_else(|| settings.embedding_provider.clone());
        let embedding_model = workspace
            .and_then(|ws| ws.embedding_model.clone())
            .unwrap_or_else(|| settings.embedding_model.clone());

        let vision_model = if settings.vision_provider == "ollama" {
            settings.ollama_vision_model.clone()
        } else {
            settings.openai_model.clone()
        };

        EffectiveConfig {
            llm_provider,
            llm_model,
            openai_api_key: settings.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            ollama_base_url: settings.ollama_base_url.clone(),
            embedding_provider,
            embedding_model,
            enable_vision: settings.enable_vision_processing,
            vision_provider: settings.vision_provider.clone(),
            vision_model,
        }
    }
}

/// Per-operation resolved configuration. Provider adapters are built from
/// this snapshot so mid-operation settings changes never affect in-flight
/// work.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub llm_provider: String,
    pub llm_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub ollama_base_url: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub enable_vision: bool,
    pub vision_provider: String,
    pub vision_model: String,
}

impl EffectiveConfig {
    fn require_openai_key(&self) -> Result<&str, AppError> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::Configuration("openai_api_key".into()))
    }

    pub fn build_llm(&self) -> Result<LlmProvider, AppError> {
        match self.llm_provider.as_str() {
            "openai" => {
                let key = self.require_openai_key()?;
                Ok(LlmProvider::openai(key, &self.openai_base_url, &self.llm_model))
            }
            "ollama" => {
                if self.ollama_base_url.is_empty() {
                    return Err(AppError::Configuration("ollama_base_url".into()));
                }
                Ok(LlmProvider::ollama(&self.ollama_base_url, &self.llm_model))
            }
            _ => Err(AppError::Configuration("llm_provider".into())),
        }
    }

    pub async fn build_embedder(&self) -> Result<EmbeddingProvider, AppError> {
        match self.embedding_provider.as_str() {
            "openai" => {
                let key = self.require_openai_key()?;
                EmbeddingProvider::openai(key, &self.openai_base_url, &self.embedding_model)
            }
            "huggingface" => EmbeddingProvider::huggingface(&self.embedding_model).await,
            "hashed" => {
                // Deterministic backend used by the test suite
                let dimension = self
                    .embedding_model
                    .strip_prefix("hashed-")
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(384);
                Ok(EmbeddingProvider::hashed(dimension))
            }
            _ => Err(AppError::Configuration("embedding_provider".into())),
        }
    }

    /// Builds the vision adapter, or `None` when vision is disabled.
    pub fn build_vision(&self) -> Result<Option<VisionProvider>, AppError> {
        if !self.enable_vision {
            return Ok(None);
        }

        match self.vision_provider.as_str() {
            "openai" => {
                let key = self.require_openai_key()?;
                Ok(Some(VisionProvider::openai(
                    key,
                    &self.openai_base_url,
                    &self.vision_model,
                )))
            }
            "ollama" => {
                if self.ollama_base_url.is_empty() {
                    return Err(AppError::Configuration("ollama_base_url".into()));
                }
                Ok(Some(VisionProvider::ollama(
                    &self.ollama_base_url,
                    &self.vision_model,
                )))
            }
            _ => Err(AppError::Configuration("vision_provider".into())),
        }
    }

    pub fn build_tts(&self) -> Result<TtsProvider, AppError> {
        let key = self.require_openai_key()?;
        Ok(TtsProvider::openai(key, &self.openai_base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn handle_with_key(key: Option<&str>) -> SettingsHandle {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let config = AppConfig {
            openai_api_key: key.map(str::to_string),
            ..AppConfig::default()
        };
        SettingsHandle::initialize(db, &config)
            .await
            .expect("initialize settings")
    }

    #[tokio::test]
    async fn workspace_overrides_take_precedence() {
        let handle = handle_with_key(Some("sk-test")).await;

        let mut workspace = Workspace::new("Biology".into());
        workspace.embedding_provider = Some("huggingface".into());
        workspace.embedding_model = Some("all-MiniLM-L6-v2".into());

        let effective = handle.effective(Some(&workspace)).await;
        assert_eq!(effective.embedding_provider, "huggingface");
        assert_eq!(effective.embedding_model, "all-MiniLM-L6-v2");
        // Unset overrides fall back to globals
        assert_eq!(effective.llm_provider, "openai");
        assert_eq!(effective.llm_model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn ollama_provider_uses_ollama_model_default() {
        let handle = handle_with_key(None).await;
        handle
            .update(SystemSettingsUpdate {
                llm_provider: Some("ollama".into()),
                ..Default::default()
            })
            .await
            .expect("update");

        let effective = handle.effective(None).await;
        assert_eq!(effective.llm_provider, "ollama");
        assert_eq!(effective.llm_model, "llama3.1");
        assert!(effective.build_llm().is_ok());
    }

    #[tokio::test]
    async fn openai_without_key_is_a_configuration_error() {
        let handle = handle_with_key(None).await;
        let effective = handle.effective(None).await;

        let result = effective.build_llm();
        assert!(matches!(result, Err(AppError::Configuration(field)) if field == "openai_api_key"));

        let result = effective.build_embedder().await;
        assert!(matches!(result, Err(AppError::Configuration(field)) if field == "openai_api_key"));
    }

    #[tokio::test]
    async fn vision_disabled_builds_none() {
        let handle = handle_with_key(Some("sk-test")).await;
        let effective = handle.effective(None).await;
        assert!(effective.build_vision().expect("build").is_none());

        handle
            .update(SystemSettingsUpdate {
                enable_vision_processing: Some(true),
                ..Default::default()
            })
            .await
            .expect("update");
        let effective = handle.effective(None).await;
        assert!(effective.build_vision().expect("build").is_some());
    }

    #[tokio::test]
    async fn update_writes_through_to_db() {
        let handle = handle_with_key(Some("sk-test")).await;
        handle
            .update(SystemSettingsUpdate {
                embedding_model: Some("text-embedding-3-large".into()),
                ..Default::default()
            })
            .await
            .expect("update");

        let persisted = SystemSettings::get_current(&handle.db).await.expect("get");
        assert_eq!(persisted.embedding_model, "text-embedding-3-large");

        let cached = handle.current().await;
        assert_eq!(cached.embedding_model, "text-embedding-3-large");
    }

    #[tokio::test]
    async fn hashed_backend_resolves_dimension_from_model() {
        let handle = handle_with_key(None).await;
        handle
            .update(SystemSettingsUpdate {
                embedding_provider: Some("hashed".into()),
                embedding_model: Some("hashed-64".into()),
                ..Default::default()
            })
            .await
            .expect("update");

        let effective = handle.effective(None).await;
        let embedder = effective.build_embedder().await.expect("build");
        assert_eq!(embedder.dimension(), 64);
    }
}
