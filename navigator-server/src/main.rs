use axum::{extract::State, routing::get, Json, Router};
use sql_navigator::{NavigatorLayer, SessionRegistry};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

mod config;

use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let registry = SessionRegistry::new(config.pool);

    // The navigator router is stateless, so it is merged after with_state()
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .with_state(registry.clone())
        .merge(NavigatorLayer::new("/navigator", registry).into_router())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    tracing::info!(address = %config.bind, "server running");
    tracing::info!("health check at http://{}/api/health", config.bind);
    tracing::info!("navigator API at http://{}/navigator/api", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn root_handler() -> &'static str {
    "Welcome to the sql-navigator server"
}

async fn health_handler(State(registry): State<SessionRegistry>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": registry.len().await,
    }))
}
