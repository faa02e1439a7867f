use api_router::{api_routes_v1, api_state::ApiState};
use common::utils::config::get_config;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let api_state = ApiState::new(&config).await?;

    let app = axum::Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state)
        .layer(TraceLayer::new_for_http());

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!(address = %serve_address, "starting api server");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
