mod app;
mod auth;
mod bulk;
mod cache;
mod config;
mod db;
mod error;
mod mail;
mod models;
mod orders;
mod receipts;
mod state;
mod storage;
mod store;
mod users;

#[cfg(test)]
mod fakes;

use crate::config::AppConfig;
use crate::receipts::queue::spawn_workers;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "ticketing=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let workers = config.render_workers;
    let (app_state, receiver) = AppState::init(config).await?;

    let handles = spawn_workers(receiver, app_state.render_context(), workers);
    tracing::info!(workers = handles.len(), "render workers started");

    app::serve(app::build_app(app_state)).await?;

    // The router owned the last queue sender; workers drain what is left and stop.
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "render worker panicked");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}
