use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use common::utils::config::get_config;
use ingestion_pipeline::run_worker_loop;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Single-process deployment: runs the API server and the ingestion worker loop side by
/// side against one store, for setups that don't want to split them across two binaries.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let api_state = ApiState::new(&config).await?;

    let worker_db = api_state.db.clone();
    let worker_pipeline = api_state.ingestion.clone();
    tokio::spawn(async move {
        if let Err(err) = run_worker_loop(worker_db, worker_pipeline).await {
            error!(error = %err, "ingestion worker loop exited");
        }
    });

    let app = axum::Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state)
        .layer(TraceLayer::new_for_http());

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!(address = %serve_address, "starting combined server+worker process");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
