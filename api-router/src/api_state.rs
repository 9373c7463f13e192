use std::sync::Arc;

use common::{
    settings::SettingsHandle,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::AppConfig,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks the in-flight model download so `POST /settings/cancel-download`
/// can abort it. Starting a new download supersedes (and cancels) the
/// previous one.
#[derive(Clone, Default)]
pub struct DownloadController {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl DownloadController {
    pub async fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut guard = self.current.lock().await;
        if let Some(previous) = guard.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    pub async fn cancel(&self) {
        if let Some(token) = self.current.lock().await.take() {
            token.cancel();
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub settings: SettingsHandle,
    pub downloads: DownloadController,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        storage: StorageManager,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        db.apply_migrations().await?;
        let settings = SettingsHandle::initialize(Arc::clone(&db), config).await?;

        Ok(Self {
            db,
            config: config.clone(),
            storage,
            settings,
            downloads: DownloadController::default(),
        })
    }

    /// Assembles a state over pre-built resources (tests, embedded server).
    pub fn with_resources(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            db,
            config,
            storage,
            settings,
            downloads: DownloadController::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_download_cancels_previous() {
        let controller = DownloadController::default();

        let first = controller.begin().await;
        assert!(!first.is_cancelled());

        let second = controller.begin().await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        controller.cancel().await;
        assert!(second.is_cancelled());
    }
}
