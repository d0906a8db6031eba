mod app;
mod config;
mod controllers;
mod csrf;
mod email;
mod hash;
mod middleware;
mod models;
mod state;
mod storage;
mod token;
mod views;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "lenslocked=debug,axum=info,tower_http=info".to_string());
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
    let state = AppState::init(config.clone()).await?;

    if config.destructive_reset {
        state.services.destructive_reset().await?;
    } else {
        state.services.auto_migrate().await?;
    }

    let app = app::build_app(state.clone());
    let served = app::serve(app, &config).await;

    state.services.close().await;
    tracing::info!("shut down");
    served
}
