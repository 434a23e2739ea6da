//! HTTP front-end: router, shared state and the serve loop.

mod handlers;

use crate::clients::{GeminiClient, SearchClient, SheetsClient};
use crate::config::Config;
use crate::http;
use crate::session::SessionStore;
use crate::usage::UsageService;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::get;
use axum::Router;
use log::info;
use std::sync::Arc;

/// Uploaded CSV files larger than this are rejected.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub usage: UsageService,
    pub sessions: SessionStore,
    pub search: SearchClient,
    pub gemini: GeminiClient,
    pub sheets: SheetsClient,
}

impl AppState {
    pub fn new(config: Config, usage: UsageService) -> reqwest::Result<Self> {
        let client = http::build_client(&config)?;
        Ok(Self {
            search: SearchClient::new(client.clone(), &config),
            gemini: GeminiClient::new(client.clone(), &config),
            sheets: SheetsClient::new(client, &config),
            config: Arc::new(config),
            usage,
            sessions: SessionStore::new(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::upload))
        .route("/sheet", axum::routing::post(handlers::load_sheet))
        .route("/query", axum::routing::post(handlers::run_query))
        .route("/result", get(handlers::show_result).post(handlers::show_result))
        .route("/download", get(handlers::download))
        .route("/usage", get(handlers::usage))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "listening on http://{} (daily limit {})",
        listener.local_addr()?,
        state.usage.limit()
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
