use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use runewell_common::file_config::load_rank_catalog;
use runewell_common::AppConfig;
use runewell_engine::{
    rank, BadgeCatalog, EngineConfig, MemoryProgressionStore, ProgressionEngine,
    ProgressionStore,
};
use runewell_store::PgProgressionStore;

mod rest;

pub type Engine = ProgressionEngine<Arc<dyn ProgressionStore>>;

pub struct AppState {
    pub engine: Engine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Progression
        .route("/api/progression/events", post(rest::api_apply_event))
        .route("/api/progression/{user_id}", get(rest::api_snapshot))
        .route("/api/progression/{user_id}/profile", get(rest::api_profile))
        .route("/api/progression/{user_id}/reconcile", post(rest::api_reconcile))
        .route("/api/progression/{user_id}/grant", post(rest::api_grant))
        // Catalogs
        .route("/api/ranks", get(rest::api_ranks))
        .route("/api/badges", get(rest::api_badges))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Progression state is per user and changes on every event
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn ProgressionStore>> {
    let Some(url) = config.database_url.as_deref() else {
        let ranks = match &config.rank_catalog_path {
            Some(path) => load_rank_catalog(path)?,
            None => rank::default_ranks(),
        };
        info!(ranks = ranks.len(), "Using in-memory progression store");
        return Ok(Arc::new(MemoryProgressionStore::new().with_ranks(ranks)));
    };

    let store = PgProgressionStore::connect(url)
        .await
        .context("Failed to connect to Postgres")?;
    store.migrate().await.context("Failed to run migrations")?;

    if let Some(path) = &config.rank_catalog_path {
        let ranks = load_rank_catalog(path)?;
        let removed = store.sync_ranks(&ranks).await?;
        info!(
            ranks = ranks.len(),
            removed,
            path = %path.display(),
            "Rank catalog synced"
        );
    } else if store.list_ranks().await?.is_empty() {
        store.sync_ranks(&rank::default_ranks()).await?;
        info!("Seeded default rank catalog");
    }

    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("runewell=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    config.log_redacted();

    let catalog = match &config.badge_catalog_path {
        Some(path) => BadgeCatalog::from_file(path)?,
        None => BadgeCatalog::builtin(),
    };
    info!(badges = catalog.len(), "Badge catalog loaded");

    let store = build_store(&config).await?;
    let engine = ProgressionEngine::with_config(
        store,
        catalog,
        EngineConfig {
            max_conflict_retries: config.max_conflict_retries,
        },
    );

    let app = router(Arc::new(AppState { engine }));

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Runewell API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
