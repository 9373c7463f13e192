use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::{
    settings::SettingsHandle,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use generation_pipeline::podcast::sweep_orphaned_audio;
use ingestion_pipeline::{pipeline::IngestionPipeline, run_worker_loop};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined binary: API server plus an embedded ingestion worker. Deploys
/// that need independent scaling run the `server` and `worker` binaries
/// instead.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    let api_state = ApiState::new(&config, storage.clone()).await?;

    if let Err(e) = sweep_orphaned_audio(&api_state.db, &storage).await {
        error!("Startup audio sweep failed: {e}");
    }

    // The worker uses its own connection so long ingestion phases never hold
    // resources the request path is waiting on.
    let worker_db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    let worker_settings = SettingsHandle::initialize(Arc::clone(&worker_db), &config).await?;
    let ingestion_pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&worker_db),
        worker_settings,
        storage.clone(),
        config.clone(),
    ));

    let app: Router = Router::new().merge(api_routes()).with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    info!("Starting embedded worker");
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        result = run_worker_loop(worker_db, ingestion_pipeline) => {
            if let Err(e) = result {
                error!("Worker process error: {}", e);
            }
        }
    }

    Ok(())
}
