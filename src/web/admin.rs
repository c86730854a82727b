//! Admin routes, authenticated with `Authorization: Bearer <ADMIN_TOKEN>`
//!
//! - `POST /admin/refresh/:league_id?week=` refresh one league's matchups
//! - `GET /admin/leagues/:league_id/matchups?week=&max_age_secs=` cached matchups
//! - `PUT /admin/users/:user_id` create or rename a chat user
//! - `PUT /admin/users/:user_id/{timezone,language,sleeper}` user settings
//! - `POST /admin/users/:user_id/leagues` link a league
//! - `DELETE /admin/users/:user_id/leagues/:league_id` unlink a league
//! - `PUT /admin/users/:user_id/leagues/:league_id/alerts/:kind` alert switch
//! - `GET /admin/logs?count=&level=` recent captured log events
//! - `GET /admin/logs/stream` live log events over SSE

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn, Level};

use super::server::AppState;
use crate::error::BotError;
use crate::messages;
use crate::store::{AlertKind, League, Platform, User};

const DEFAULT_LOG_COUNT: usize = 200;
const DEFAULT_MATCHUPS_MAX_AGE_SECS: i64 = 300;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/refresh/:league_id", post(refresh_league))
        .route("/leagues/:league_id/matchups", get(league_matchups))
        .route("/users/:user_id", put(upsert_user))
        .route("/users/:user_id/timezone", put(set_timezone))
        .route("/users/:user_id/language", put(set_language))
        .route("/users/:user_id/sleeper", put(link_sleeper))
        .route("/users/:user_id/leagues", post(link_league))
        .route("/users/:user_id/leagues/:league_id", delete(unlink_league))
        .route("/users/:user_id/leagues/:league_id/alerts/:kind", put(set_alert))
        .route("/logs", get(recent_logs))
        .route("/logs/stream", get(logs_stream))
        .with_state(state)
}

pub(super) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Status code for a failed store operation
fn store_error_response(e: BotError) -> Response {
    let status = match &e {
        BotError::UserNotFound { .. } | BotError::LeagueNotFound { .. } => StatusCode::NOT_FOUND,
        BotError::InvalidTimezone { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Store update failed: {}", e);
    }
    error_response(status, &e.to_string())
}

pub(super) fn token_matches(expected: &str, provided: Option<&str>) -> bool {
    provided.is_some_and(|token| !expected.is_empty() && token.trim() == expected)
}

/// Check the bearer token, or produce the response to send instead
fn require_admin(headers: &HeaderMap, state: &AppState) -> Result<(), Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(error_response(StatusCode::NOT_FOUND, "admin routes are disabled"));
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if token_matches(expected, provided) {
        Ok(())
    } else {
        warn!("Rejected admin request with missing or invalid token");
        Err(error_response(StatusCode::UNAUTHORIZED, "invalid token"))
    }
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    week: Option<u32>,
}

/// POST /admin/refresh/:league_id
async fn refresh_league(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(league_id): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }

    info!(league_id = %league_id, week = ?params.week, "Manual league refresh");
    match state.jobs.refresh_league(&league_id, params.week).await {
        Ok(refreshed) => Json(refreshed).into_response(),
        Err(e) => {
            warn!(league_id = %league_id, "Manual refresh failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchupsParams {
    week: u32,
    max_age_secs: Option<i64>,
}

/// GET /admin/leagues/:league_id/matchups
async fn league_matchups(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(league_id): Path<String>,
    Query(params): Query<MatchupsParams>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }

    let max_age = chrono::Duration::seconds(
        params
            .max_age_secs
            .unwrap_or(DEFAULT_MATCHUPS_MAX_AGE_SECS)
            .max(0),
    );
    match state.jobs.matchups(&league_id, params.week, max_age).await {
        Ok(matchups) => Json(matchups).into_response(),
        Err(e) => {
            warn!(league_id = %league_id, week = params.week, "Matchups lookup failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpsertUserBody {
    display_name: String,
    platform: Option<Platform>,
}

/// PUT /admin/users/:user_id - existing settings and links are kept
async fn upsert_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<UpsertUserBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }

    let user = match state.store.get_user(&user_id).await {
        Some(mut existing) => {
            existing.display_name = body.display_name;
            if body.platform.is_some() {
                existing.platform = body.platform;
            }
            existing
        }
        None => User::new(&user_id, &body.display_name, body.platform),
    };
    match state.store.upsert_user(user.clone()).await {
        Ok(()) => {
            info!(user_id = %user_id, "User saved");
            Json(user).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct TimezoneBody {
    timezone: String,
}

/// PUT /admin/users/:user_id/timezone
async fn set_timezone(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<TimezoneBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    match state.store.set_timezone(&user_id, &body.timezone).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LanguageBody {
    language: String,
}

/// PUT /admin/users/:user_id/language
async fn set_language(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<LanguageBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    let language = body.language.trim().to_lowercase();
    if !messages::supported_languages().contains(&language.as_str()) {
        return error_response(StatusCode::BAD_REQUEST, "unsupported language");
    }
    match state.store.set_language(&user_id, &language).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SleeperBody {
    sleeper_user_id: String,
}

/// PUT /admin/users/:user_id/sleeper
async fn link_sleeper(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<SleeperBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    let sleeper_user_id = body.sleeper_user_id.trim();
    if sleeper_user_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "sleeper_user_id is empty");
    }
    match state.store.link_sleeper_account(&user_id, sleeper_user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LinkLeagueBody {
    #[serde(flatten)]
    league: League,
    roster_id: u32,
}

/// POST /admin/users/:user_id/leagues
async fn link_league(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<LinkLeagueBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    let league_id = body.league.league_id.clone();
    match state.store.link_league(&user_id, body.league, body.roster_id).await {
        Ok(()) => {
            info!(user_id = %user_id, league_id = %league_id, "League linked");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error_response(e),
    }
}

/// DELETE /admin/users/:user_id/leagues/:league_id
async fn unlink_league(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((user_id, league_id)): Path<(String, String)>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    match state.store.remove_league(&user_id, &league_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "user is not in that league"),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct AlertBody {
    enabled: bool,
}

/// PUT /admin/users/:user_id/leagues/:league_id/alerts/:kind
async fn set_alert(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((user_id, league_id, kind)): Path<(String, String, AlertKind)>,
    Json(body): Json<AlertBody>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }
    match state
        .store
        .set_alert(&user_id, &league_id, kind, body.enabled)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LogParams {
    count: Option<usize>,
    /// Minimum level, e.g. "warn"
    level: Option<String>,
}

/// GET /admin/logs
async fn recent_logs(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }

    let min_level = match params.level.as_deref().map(str::parse::<Level>) {
        None => None,
        Some(Ok(level)) => Some(level),
        Some(Err(_)) => return error_response(StatusCode::BAD_REQUEST, "unknown log level"),
    };
    let count = params.count.unwrap_or(DEFAULT_LOG_COUNT);
    Json(state.log_buffer.get_recent(count, min_level)).into_response()
}

/// GET /admin/logs/stream
async fn logs_stream(headers: HeaderMap, State(state): State<AppState>) -> Response {
    if let Err(response) = require_admin(&headers, &state) {
        return response;
    }

    let rx = state.log_buffer.subscribe();
    // Lagged receivers just skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result
            .ok()
            .map(|entry| Ok::<_, Infallible>(Event::default().data(entry.to_json())))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response()
}
