//! Callpool server - outreach call-campaign coordinator

mod api;
mod audit;
mod error;
mod import;
mod models;
mod store;

use chrono::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::store::{Store, StoreConfig};

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
}

fn env_duration(var: &str, default_secs: i64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default_secs);
    Duration::seconds(secs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callpool=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:callpool.db".into());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = StoreConfig {
        lock_timeout: env_duration("LOCK_TIMEOUT_SECS", 15 * 60),
        undo_ttl: env_duration("UNDO_TTL_SECS", 10 * 60),
    };
    let store = Store::with_config(pool, config);
    let state = Arc::new(AppState { store });

    // Build router
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
