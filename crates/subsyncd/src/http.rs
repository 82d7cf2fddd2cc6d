//! HTTP surface
//!
//! ```text
//! GET /                 run one reconciliation
//! GET /read-collection  same, under the historical path
//! HEAD, other methods   405 {"error": "Method not allowed"}
//! ```
//!
//! A run is request-scoped: nothing is kept between requests except what
//! the run wrote to the store.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use subsync_core::{OutcomeEntry, Reconciler};
use tower_http::trace::TraceLayer;
use tracing::error;

/// State shared across handlers
pub struct AppState {
    pub reconciler: Reconciler,
}

impl AppState {
    pub fn new(reconciler: Reconciler) -> Self {
        Self { reconciler }
    }
}

/// Body of a completed run
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub message: String,
    pub successes: Vec<OutcomeEntry>,
    pub failures: Vec<OutcomeEntry>,
    pub skipped: Vec<OutcomeEntry>,
}

/// Create the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", reconcile_route())
        .route("/read-collection", reconcile_route())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reconcile_route() -> MethodRouter<Arc<AppState>> {
    // A run writes to the store, so HEAD must not fall through to GET
    get(read_collection)
        .head(method_not_allowed)
        .fallback(method_not_allowed)
}

async fn read_collection(State(state): State<Arc<AppState>>) -> Response {
    let collection = state.reconciler.collection();

    match state.reconciler.run().await {
        Ok((records, outcome)) => {
            let body = RunResponse {
                message: outcome.summary(records),
                successes: outcome.successes,
                failures: outcome.failures,
                skipped: outcome.skipped,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!("Failed to read {}: {}", collection, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to read {}: {}", collection, e)})),
            )
                .into_response()
        }
    }
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"error": "Method not allowed"})),
    )
        .into_response()
}
