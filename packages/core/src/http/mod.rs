//! HTTP invocation boundary for the reorder executor
//!
//! Exposes [`ReorderExecutor`] as a standalone callable unit:
//!
//! ```bash
//! curl -X POST http://localhost:3001/api/reorder \
//!   -H 'content-type: application/json' \
//!   -d '{"scope":{"kind":"lists","ownerId":"u1"},"updates":[{"id":"a","targetKey":2},{"id":"b","targetKey":1}]}'
//! # {"success":true}
//! ```
//!
//! Executor failures are reported in the body (`{"success":false,"error":"..."}`)
//! with status 200; only malformed JSON is rejected at the HTTP level.

use crate::models::ScopeId;
use crate::operations::{KeyAssignment, ReorderError, ReorderExecutor};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request payload: `{ scope, updates: [{id, targetKey}, ...] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub scope: ScopeId,
    #[serde(default)]
    pub updates: Vec<KeyAssignment>,
}

/// Response payload: `{ success, error? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<Result<T, ReorderError>> for ReorderResponse {
    fn from(result: Result<T, ReorderError>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    version: String,
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn reorder(
    State(executor): State<Arc<ReorderExecutor>>,
    Json(request): Json<ReorderRequest>,
) -> Json<ReorderResponse> {
    if request.updates.is_empty() {
        return Json(ReorderResponse {
            success: true,
            error: None,
        });
    }

    tracing::debug!(
        "HTTP reorder of {} ({} update(s))",
        request.scope,
        request.updates.len()
    );
    let result = executor.reorder(&request.scope, &request.updates).await;
    Json(result.into())
}

/// Router with `GET /api/health` and `POST /api/reorder`
pub fn routes(executor: Arc<ReorderExecutor>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/reorder", post(reorder))
        .layer(TraceLayer::new_for_http())
        .with_state(executor)
}

/// Bind `127.0.0.1:<port>` and serve [`routes`] until the process exits
pub async fn start_server(executor: Arc<ReorderExecutor>, port: u16) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    tracing::info!("Reorder endpoint listening on http://{}/api/reorder", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, routes(executor)).await
}
