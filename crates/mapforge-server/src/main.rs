//! Mapforge HTTP API Server
//!
//! Provides REST API endpoints for marker uploads, placement review and
//! versioned map exports, and serves the map directories as static files.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    response::Json,
    routing::get,
};
use mapforge_registry::{FileSystemStorage, MapRegistry, RegistryError, SqliteStorage};
use serde_json::{Value, json};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

mod config;
mod error;
mod identity;
mod models;
mod routes;

use config::ServerConfig;
use error::Result;

/// Main application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MapRegistry>,
    pub config: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "mapforge_server=debug,mapforge_registry=debug,tower_http=debug".to_string()
        }))
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    info!("Starting Mapforge Server on {}:{}", config.host, config.port);

    let storage = FileSystemStorage::new(config.storage_layout())
        .await
        .map_err(RegistryError::from)?;

    ensure_database_dir(&config.database_url).await?;
    let metadata = SqliteStorage::new(&config.database_url).await?;

    // Create registry
    let registry = Arc::new(MapRegistry::new(
        Arc::new(storage),
        Arc::new(metadata),
        config.registry_config(),
    ));

    // Undo file moves whose metadata never committed
    match registry.reconcile().await {
        Ok(report) if report.orphaned > 0 => {
            warn!("{} marker assets have no file on disk", report.orphaned)
        }
        Ok(_) => {}
        Err(e) => error!("Failed to reconcile marker storage: {}", e),
    }

    let state = AppState {
        registry,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| error::ApiError::Config(format!("Invalid HOST value: {}", config.host)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// SQLite creates the database file but not its directory
async fn ensure_database_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .map(|rest| rest.split('?').next().unwrap_or(rest));

    if let Some(parent) = path
        .filter(|p| !p.is_empty() && *p != ":memory:")
        .and_then(|p| Path::new(p).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let maps = ServeDir::new(&state.config.map_root);
    let body_limit = state.config.upload_body_limit();
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api", api_routes())
        // Uploaded markers, templates and composites
        .nest_service("/maps", maps)
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// API routes
fn api_routes() -> Router<AppState> {
    Router::new().nest("/map", routes::map::router())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any)
}

/// Health check endpoint
async fn health_check() -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "mapforge-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": time::OffsetDateTime::now_utc()
    })))
}
