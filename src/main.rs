//! Theme Studio Backend
//!
//! Section/block composition for multi-tenant storefronts: hybrid template
//! resolution over static themes, a draft/publish lifecycle, and a message bus
//! to live previews. SQLite persistence, REST + WebSocket via axum.

mod api;
mod auth;
mod blocks;
mod bus;
mod config;
mod db;
mod errors;
mod models;
mod publish;
mod resolver;
mod settings;
mod theme;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bus::BusRegistry;
use config::Config;
use db::Repository;
use publish::DraftPublisher;
use resolver::HybridLoader;
use theme::ThemeCatalog;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub themes: Arc<ThemeCatalog>,
    pub loader: Arc<HybridLoader>,
    pub publisher: Arc<DraftPublisher>,
    pub buses: Arc<BusRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the services together over one repository and theme catalog.
    pub fn new(repo: Arc<Repository>, themes: Arc<ThemeCatalog>, config: Config) -> Self {
        let loader = Arc::new(HybridLoader::new(Arc::clone(&repo), Arc::clone(&themes)));
        let publisher = Arc::new(DraftPublisher::new(repo.clone()));
        let buses = Arc::new(BusRegistry::new(
            config.editor_origin.clone(),
            config.preview_ready_timeout,
        ));
        Self {
            repo,
            themes,
            loader,
            publisher,
            buses,
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Theme Studio Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Editor origin: {}", config.editor_origin);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (STUDIO_API_PSK). Authentication is disabled!");
    }

    // Load themes
    let mut themes = ThemeCatalog::builtin()?;
    if let Some(dir) = &config.themes_dir {
        let loaded = themes.load_dir(dir)?;
        tracing::info!("Loaded {} themes from {:?}", loaded, dir);
    }
    tracing::info!("Theme catalog ready with {} themes", themes.list().len());

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let bind_addr = config.bind_addr;
    let state = AppState::new(repo, Arc::new(themes), config);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let template = "/stores/{subdomain}/templates/{template_type}";
    let section = format!("{template}/sections/{{section_id}}");
    let block = format!("{section}/blocks/{{block_id}}");

    // Editor routes
    let api_routes = Router::new()
        // Themes
        .route("/themes", get(api::list_themes))
        .route("/themes/{theme_id}", get(api::get_theme))
        .route(
            "/themes/{theme_id}/sections/{section_type}/presets",
            get(api::list_presets),
        )
        // Stores
        .route("/stores", post(api::create_store))
        .route("/stores/{subdomain}", get(api::get_store))
        .route("/stores/{subdomain}/customizations", get(api::list_customizations))
        // Templates and sections
        .route(template, get(api::resolve_template))
        .route(&format!("{template}/sections"), post(api::add_section))
        .route(&format!("{template}/sections/order"), put(api::reorder_sections))
        .route(
            &section,
            put(api::update_section).delete(api::delete_section),
        )
        // Blocks
        .route(&format!("{section}/blocks"), post(api::add_block))
        .route(&format!("{section}/blocks/order"), put(api::reorder_blocks))
        .route(&block, put(api::update_block).delete(api::delete_block))
        .route(&format!("{block}/duplicate"), post(api::duplicate_block))
        // Draft / publish
        .route(
            "/stores/{subdomain}/publish",
            get(api::get_publish_state).post(api::publish),
        )
        .route("/stores/{subdomain}/draft", post(api::save_draft))
        // Preview
        .route("/stores/{subdomain}/preview/ws", get(api::preview_socket))
        .route(
            "/stores/{subdomain}/preview/messages",
            post(api::send_preview_message),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/storefront/{subdomain}/{template_type}",
            get(api::storefront_sections),
        );

    Router::new()
        .nest("/api", api_routes)
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
