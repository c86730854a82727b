//! Web server setup and the public routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::admin::{admin_router, error_response, token_matches};
use crate::config::BotConfig;
use crate::jobs::{JobKind, JobStatus, SharedJobManager};
use crate::logging::SharedLogBuffer;
use crate::store::SharedStore;

pub struct WebServerConfig {
    pub port: u16,
}

impl WebServerConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            port: config.web_port,
        }
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub jobs: SharedJobManager,
    pub store: SharedStore,
    pub log_buffer: SharedLogBuffer,
    /// Admin and cron routes answer 404 when unset
    pub admin_token: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/status", get(status))
        .route("/cron/refresh", get(cron_refresh))
        .with_state(state.clone())
        .nest("/admin", admin_router(state))
        .layer(cors)
}

pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    if state.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin and cron routes are disabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "Gridiron bot running"
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    jobs: JobStatus,
    users: usize,
    leagues: usize,
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        jobs: state.jobs.status().await,
        users: state.store.user_count().await,
        leagues: state.store.league_count().await,
    })
}

#[derive(Debug, Deserialize)]
struct CronParams {
    token: Option<String>,
}

/// GET /cron/refresh?token= - refresh every active league, for external schedulers
async fn cron_refresh(State(state): State<AppState>, Query(params): Query<CronParams>) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return error_response(StatusCode::NOT_FOUND, "cron routes are disabled");
    };
    if !token_matches(expected, params.token.as_deref()) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid token");
    }

    info!("Cron refresh triggered");
    match state.jobs.run_once(JobKind::Refresh).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
    }
}
