use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::StoredObject},
    utils::config::AppConfig,
};

use super::workspace::deserialize_flexible_id;

/// Process-wide provider settings, persisted as a singleton row. Reads go
/// through the cached `SettingsHandle`; this type owns the persistence.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SystemSettings {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub llm_provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub enable_vision_processing: bool,
    pub vision_provider: String,
    pub ollama_vision_model: String,
}

impl StoredObject for SystemSettings {
    fn table_name() -> &'static str {
        "system_settings"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

/// Partial update accepted by `POST /settings`; absent fields keep their value.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SystemSettingsUpdate {
    pub llm_provider: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub enable_vision_processing: Option<bool>,
    pub vision_provider: Option<String>,
    pub ollama_vision_model: Option<String>,
}

impl SystemSettings {
    fn seed(config: &AppConfig) -> Self {
        Self {
            id: "current".to_string(),
            llm_provider: "openai".to_string(),
            openai_api_key: config.openai_api_key.clone(),
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: config.ollama_base_url.clone(),
            ollama_model: "llama3.1".to_string(),
            embedding_provider: "openai".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            enable_vision_processing: false,
            vision_provider: "openai".to_string(),
            ollama_vision_model: "llava".to_string(),
        }
    }

    /// Creates the singleton row on first startup; later startups keep the
    /// stored values untouched.
    pub async fn ensure_initialized(
        db: &SurrealDbClient,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        if let Some(existing) = db.get_item::<Self>("current").await? {
            return Ok(existing);
        }

        let seeded = Self::seed(config);
        db.store_item(seeded.clone()).await?;
        Ok(seeded)
    }

    pub async fn get_current(db: &SurrealDbClient) -> Result<Self, AppError> {
        let settings: Option<Self> = db.get_item("current").await?;
        settings.ok_or(AppError::NotFound("System settings not found".into()))
    }

    pub fn merged(&self, update: SystemSettingsUpdate) -> Self {
        let mut next = self.clone();
        if let Some(v) = update.llm_provider {
            next.llm_provider = v;
        }
        if let Some(v) = update.openai_api_key {
            next.openai_api_key = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = update.openai_model {
            next.openai_model = v;
        }
        if let Some(v) = update.ollama_base_url {
            next.ollama_base_url = v;
        }
        if let Some(v) = update.ollama_model {
            next.ollama_model = v;
        }
        if let Some(v) = update.embedding_provider {
            next.embedding_provider = v;
        }
        if let Some(v) = update.embedding_model {
            next.embedding_model = v;
        }
        if let Some(v) = update.enable_vision_processing {
            next.enable_vision_processing = v;
        }
        if let Some(v) = update.vision_provider {
            next.vision_provider = v;
        }
        if let Some(v) = update.ollama_vision_model {
            next.ollama_vision_model = v;
        }
        next
    }

    pub async fn update(db: &SurrealDbClient, changes: Self) -> Result<Self, AppError> {
        // We need to use a direct query for the update with MERGE
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('system_settings', 'current') MERGE $changes RETURN AFTER")
            .bind(("changes", changes))
            .await?
            .take(0)?;

        updated.ok_or(AppError::Validation(
            "Something went wrong updating the settings".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn ensure_initialized_seeds_once() {
        let db = memory_db().await;
        let config = AppConfig::default();

        let settings = SystemSettings::ensure_initialized(&db, &config)
            .await
            .expect("initialize");
        assert_eq!(settings.id, "current");
        assert_eq!(settings.llm_provider, "openai");
        assert_eq!(settings.embedding_model, "text-embedding-3-small");
        assert!(!settings.enable_vision_processing);

        // A second call keeps stored values
        let mut changed = settings.clone();
        changed.openai_model = "gpt-4o".to_string();
        SystemSettings::update(&db, changed).await.expect("update");

        let again = SystemSettings::ensure_initialized(&db, &config)
            .await
            .expect("initialize again");
        assert_eq!(again.openai_model, "gpt-4o");
    }

    #[tokio::test]
    async fn get_current_nonexistent_errors() {
        let db = memory_db().await;
        let result = SystemSettings::get_current(&db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_persists_changes() {
        let db = memory_db().await;
        let settings = SystemSettings::ensure_initialized(&db, &AppConfig::default())
            .await
            .expect("initialize");

        let merged = settings.merged(SystemSettingsUpdate {
            llm_provider: Some("ollama".into()),
            ollama_model: Some("qwen2.5".into()),
            enable_vision_processing: Some(true),
            ..Default::default()
        });
        let updated = SystemSettings::update(&db, merged).await.expect("update");
        assert_eq!(updated.llm_provider, "ollama");
        assert_eq!(updated.ollama_model, "qwen2.5");
        assert!(updated.enable_vision_processing);

        let current = SystemSettings::get_current(&db).await.expect("get");
        assert_eq!(current, updated);
    }

    #[test]
    fn merged_clears_api_key_on_empty_string() {
        let settings = SystemSettings::seed(&AppConfig {
            openai_api_key: Some("sk-test".into()),
            ..AppConfig::default()
        });
        assert!(settings.openai_api_key.is_some());

        let cleared = settings.merged(SystemSettingsUpdate {
            openai_api_key: Some(String::new()),
            ..Default::default()
        });
        assert!(cleared.openai_api_key.is_none());
    }
}
