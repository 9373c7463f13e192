use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::{
    storage::store::StorageManager,
    utils::config::get_config,
};
use generation_pipeline::podcast::sweep_orphaned_audio;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

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

    // Reconcile audio files orphaned by a crash mid-eviction
    if let Err(e) = sweep_orphaned_audio(&api_state.db, &storage).await {
        error!("Startup audio sweep failed: {e}");
    }

    let app: Router = Router::new()
        .merge(api_routes())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
