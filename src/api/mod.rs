//! HTTP surface of the conflict service. Read-only against the store.

pub mod dto;
mod error;

pub use error::ApiError;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Json;
use tokio::net::TcpListener;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::*;

use dto::*;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Bound on each store read, independent of any client timeout.
    pub query_timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, query_timeout: Duration) -> Self {
        Self { engine, query_timeout }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/conflicts/check", post(check_conflicts))
        .route("/resources/{resource_id}/availability", get(resource_availability))
        .route("/health", get(health))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then stop accepting and drain.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    metrics::counter!(REQUESTS_TOTAL, "route" => route, "status" => status).increment(1);
    response
}

/// Run a store read under the server-side timeout.
async fn bounded<T>(
    state: &AppState,
    route: &'static str,
    query: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, ApiError> {
    let started = Instant::now();
    match tokio::time::timeout(state.query_timeout, query).await {
        Ok(result) => {
            metrics::histogram!(QUERY_DURATION_SECONDS, "route" => route)
                .record(started.elapsed().as_secs_f64());
            result.map_err(ApiError::from)
        }
        Err(_) => {
            metrics::counter!(QUERY_TIMEOUTS_TOTAL, "route" => route).increment(1);
            tracing::warn!(
                route,
                elapsed_ms = started.elapsed().as_millis() as u64,
                limit_ms = state.query_timeout.as_millis() as u64,
                "store query timed out"
            );
            Err(ApiError::Timeout(state.query_timeout))
        }
    }
}

fn ensure_store(state: &AppState) -> Result<(), ApiError> {
    if state.engine.store_reachable() {
        Ok(())
    } else {
        Err(ApiError::StoreUnavailable("schedule store is not accepting connections".into()))
    }
}

async fn check_conflicts(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let start = parse_instant("start_time", &req.start_time).map_err(ApiError::Validation)?;
    let end = parse_instant("end_time", &req.end_time).map_err(ApiError::Validation)?;
    let query = ConflictQuery::new(&req.resource_ids, start, end, req.exclude_entry_id)?;
    ensure_store(&state)?;

    let report = bounded(&state, "check", state.engine.check_conflicts(&query)).await?;
    if report.has_conflicts() {
        metrics::counter!(CONFLICTS_REPORTED_TOTAL).increment(report.conflicts.len() as u64);
    }
    Ok(Json(CheckResponse::from(&report)))
}

async fn resource_availability(
    State(state): State<AppState>,
    path: Result<Path<Id>, PathRejection>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let Path(resource_id) = path.map_err(|e| ApiError::Validation(e.body_text()))?;
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let raw_start = params
        .start_date
        .ok_or_else(|| ApiError::Validation("start_date is required".into()))?;
    let raw_end = params
        .end_date
        .ok_or_else(|| ApiError::Validation("end_date is required".into()))?;
    let start = parse_date_bound("start_date", &raw_start, false).map_err(ApiError::Validation)?;
    let end = parse_date_bound("end_date", &raw_end, true).map_err(ApiError::Validation)?;
    ensure_store(&state)?;

    let entries = bounded(
        &state,
        "availability",
        state.engine.resource_availability(resource_id, start, end),
    )
    .await?;
    Ok(Json(AvailabilityResponse {
        resource_id,
        entries: entries.into_iter().map(EntryDto::from).collect(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.engine.health();
    Json(HealthResponse {
        status: if report.store_reachable {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        },
        store_reachable: report.store_reachable,
    })
}
