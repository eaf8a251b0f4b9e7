use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState};
use crate::config::DeckforgeConfig;
use crate::generation::storage::MEDIA_PREFIX;
use crate::generation::{FsImageStore, GeminiClient, ImageService};
use crate::store::{DbHandle, DeckDb};

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub dev_cors: bool,
    pub api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub image_model: Option<String>,
    pub embedding_model: Option<String>,
    pub cost_tokens: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3140,
            db_path: PathBuf::from(".deckforge/deckforge.db"),
            media_dir: PathBuf::from(".deckforge/media"),
            dev_cors: false,
            api_key: None,
            gemini_base_url: None,
            image_model: None,
            embedding_model: None,
            cost_tokens: 5,
        }
    }
}

impl From<&DeckforgeConfig> for ServerConfig {
    fn from(config: &DeckforgeConfig) -> Self {
        let toml = &config.toml;
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            db_path: config.database_path(),
            media_dir: config.media_dir(),
            dev_cors: toml.server.dev_cors,
            api_key: config.api_key().map(String::from),
            gemini_base_url: toml.generation.base_url.clone(),
            image_model: toml.generation.image_model.clone(),
            embedding_model: toml.generation.embedding_model.clone(),
            cost_tokens: toml.generation.cost_tokens,
        }
    }
}

/// Build the full application router: API routes plus the media directory.
pub fn build_router(state: Arc<AppState>, media_dir: PathBuf, dev_cors: bool) -> Router {
    let mut app = api::api_router()
        .nest_service(MEDIA_PREFIX, ServeDir::new(media_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if dev_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Wire the image service from config. Without an API key generation is
/// disabled and search falls back to text matching.
pub fn build_image_service(config: &ServerConfig, db: DbHandle) -> Result<ImageService> {
    if config.cost_tokens < 0 {
        anyhow::bail!(
            "generation.cost_tokens must not be negative, got {}",
            config.cost_tokens
        );
    }
    let store = Arc::new(FsImageStore::new(config.media_dir.clone()));
    let mut service = ImageService::new(db, store, config.cost_tokens);

    match &config.api_key {
        Some(key) => {
            let mut client = GeminiClient::new(key.clone())
                .context("Failed to create Gemini client")?
                .with_models(config.image_model.clone(), config.embedding_model.clone());
            if let Some(url) = &config.gemini_base_url {
                client = client.with_base_url(url.clone());
            }
            let client = Arc::new(client);
            service = service
                .with_generator(client.clone())
                .with_embedder(client);
        }
        None => {
            tracing::warn!("No Gemini API key configured; image generation is disabled");
        }
    }
    Ok(service)
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.media_dir).context("Failed to create media directory")?;

    let db = DbHandle::new(
        DeckDb::new(&config.db_path).context("Failed to initialize deck database")?,
    );
    let images = build_image_service(&config, db.clone())?;
    let state = Arc::new(AppState { db, images });
    let app = build_router(state, config.media_dir.clone(), config.dev_cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, db = %config.db_path.display(), "deckforge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
