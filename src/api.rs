//! Read-only HTTP surface over the query facade.
//!
//! Every route answers with a JSON array; a query that matches nothing is an
//! empty array with status 200.

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{ApiConfig, DbConfig};
use crate::db::{CountryRow, Metric, NameRow, QueryFacade, RankedRow};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error("database query failed")]
    Database,
    #[error("query worker failed")]
    Worker,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnknownMetric(_) => StatusCode::NOT_FOUND,
            ApiError::Database | ApiError::Worker => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Details stay in the log.
        error!(error = %format!("{err:#}"), "Query failed");
        ApiError::Database
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!(error = %err, "Query task failed");
        ApiError::Worker
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status_code(), body).into_response()
    }
}

type ApiResult<T> = Result<Json<Vec<T>>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    facade: QueryFacade,
}

pub fn router(facade: QueryFacade) -> Router {
    Router::new()
        .route("/country/:name", get(country))
        .route("/top-10/:metric", get(top_ten))
        .route("/language/:language", get(language))
        .route("/timezone/:zone", get(time_zone))
        .route("/health/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { facade })
}

pub async fn serve(api: &ApiConfig, db: DbConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&api.bind)
        .await
        .with_context(|| format!("Failed to bind {}", api.bind))?;
    info!(addr = %listener.local_addr()?, database = ?db.path, "Serving country API");
    axum::serve(listener, router(QueryFacade::new(db))).await?;
    Ok(())
}

/// SQLite calls block, so they run off the async workers.
async fn blocking<T, F>(query: F) -> ApiResult<T>
where
    F: FnOnce() -> anyhow::Result<Vec<T>> + Send + 'static,
    T: Send + 'static,
{
    let rows = tokio::task::spawn_blocking(query).await??;
    Ok(Json(rows))
}

async fn country(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<CountryRow> {
    blocking(move || state.facade.lookup_by_name(&name)).await
}

async fn top_ten(State(state): State<AppState>, Path(metric): Path<String>) -> ApiResult<RankedRow> {
    let metric: Metric = metric.parse().map_err(ApiError::UnknownMetric)?;
    blocking(move || state.facade.top_by(metric)).await
}

async fn language(State(state): State<AppState>, Path(language): Path<String>) -> ApiResult<NameRow> {
    blocking(move || state.facade.by_language(&language)).await
}

async fn time_zone(State(state): State<AppState>, Path(zone): Path<String>) -> ApiResult<NameRow> {
    blocking(move || state.facade.by_time_zone(&zone)).await
}

async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}
