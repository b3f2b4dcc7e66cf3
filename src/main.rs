use std::sync::Arc;

mod app;
mod config;
mod state;
mod zones;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::zones::repo::PgZoneStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "worldtime=debug,axum=info,tower_http=info,sqlx=warn".to_string());
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

    let config = Arc::new(AppConfig::from_env()?);
    let store = PgZoneStore::connect(&config).await?;
    store.migrate().await?;

    let app_state = AppState::from_parts(Arc::new(store.clone()), config.clone());
    let served = app::serve(app::build_app(app_state), &config.host, config.port).await;

    store.close().await;
    served
}
