#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use axum::{Router, middleware::from_fn, routing::get};
use loyalty_hub_api::{
    auth::ErrorSink,
    construct_router,
    state::{State, connect_database},
};
use loyalty_hub_ledger::LedgerConfig;
use std::sync::Arc;

mod config;
mod telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    telemetry::init_telemetry()?;

    tracing::info!("Starting Loyalty Hub API Service");

    let config = config::Config::from_env()?;
    let ledger_config = LedgerConfig::from_env();
    let error_sink = ErrorSink::from_env();
    tracing::info!(
        port = config.port,
        max_connections = config.database.max_connections,
        error_sink = ?error_sink,
        "Loaded configuration"
    );

    let db = connect_database(&config.database).await?;
    let state = Arc::new(State::postgres(
        db,
        ledger_config,
        &config.jwt_secret,
        error_sink,
    ));

    let app = Router::new()
        .merge(construct_router(state))
        .route_layer(from_fn(telemetry::track_metrics))
        .route("/metrics", get(telemetry::handler));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
