//! ==============================================================================
//! server.rs - dashboard page and json api
//! ==============================================================================
//!
//! routes:
//!     GET /              static dashboard (embedded at compile time)
//!     GET /healthz       liveness
//!     GET /api/data      live shadow fetch + extraction, not read from the store
//!     GET /api/history   stored readings; ?view=recent|points overrides config
//!
//! errors:
//!     callers only ever see a short generic message. the underlying fetch,
//!     parse or store error goes to the log.
//!
//! ==============================================================================

use crate::config::{HistoryConfig, HistoryView};
use crate::domain::{ChartPoint, Reading, RecentRow};
use crate::extract::extract;
use crate::shadow::ShadowSource;
use crate::store::Store;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const DASHBOARD_HTML: &str = include_str!("../static/index.html");

pub struct ApiState<S> {
    pub source: Arc<S>,
    pub store: Store,
    pub history: HistoryConfig,
}

// derive(Clone) would require S: Clone
impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            store: self.store.clone(),
            history: self.history.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl ApiError {
    fn data_unavailable() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "failed to parse latest data",
        }
    }

    fn history_unavailable() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "failed to load history",
        }
    }

    fn bad_view() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "view must be 'recent' or 'points'",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub fn router<S: ShadowSource>(state: ApiState<S>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/healthz", get(health_handler))
        .route("/api/data", get(data_handler::<S>))
        .route("/api/history", get(history_handler::<S>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<S: ShadowSource>(bind: &str, state: ApiState<S>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// fetch the shadow now and return it flattened
async fn data_handler<S: ShadowSource>(
    State(state): State<ApiState<S>>,
) -> Result<Json<Reading>, ApiError> {
    let snapshot = state.source.fetch().await.map_err(|err| {
        tracing::error!(error = %err, "live shadow fetch failed");
        ApiError::data_unavailable()
    })?;
    let reading = extract(&snapshot).map_err(|err| {
        tracing::error!(error = %err, "live shadow could not be parsed");
        ApiError::data_unavailable()
    })?;
    Ok(Json(reading))
}

#[derive(Deserialize)]
struct HistoryParams {
    view: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum HistoryBody {
    Recent(Vec<RecentRow>),
    Points(Vec<ChartPoint>),
}

async fn history_handler<S: ShadowSource>(
    State(state): State<ApiState<S>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryBody>, ApiError> {
    let view = match params.view.as_deref().map(str::trim) {
        None | Some("") => state.history.view,
        Some(v) if v.eq_ignore_ascii_case("recent") => HistoryView::Recent,
        Some(v) if v.eq_ignore_ascii_case("points") => HistoryView::Points,
        Some(_) => return Err(ApiError::bad_view()),
    };

    let history = state.history.clone();
    let result = match view {
        HistoryView::Recent => state
            .store
            .run(move |store| store.query_recent(history.window()))
            .await
            .map(HistoryBody::Recent),
        HistoryView::Points => state
            .store
            .run(move |store| {
                store.query_recent_distinct_points(
                    history.max_points,
                    history.min_gap(),
                    history.scan_limit,
                )
            })
            .await
            .map(HistoryBody::Points),
    };

    result.map(Json).map_err(|err| {
        tracing::error!(error = %err, ?view, "history query failed");
        ApiError::history_unavailable()
    })
}
