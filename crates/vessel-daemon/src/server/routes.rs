//! Webhook HTTP surface.
//!
//! Thin axum layer over the [`Provisioner`]: request parsing, the shared
//! secret check, and error-to-status mapping live here and nowhere else.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use vessel_crypto::constant_time_str_eq;

use crate::provision::{ProvisionError, Provisioner, ProvisionRequest};

/// Header carrying the shared webhook secret.
pub const TOKEN_HEADER: &str = "x-vessel-token";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<Provisioner>,
    /// Shared secret expected in [`TOKEN_HEADER`].
    pub webhook_token: String,
    /// When set, error responses carry the full error text instead of a
    /// generic message. Development only.
    pub dev_errors: bool,
}

/// Build the daemon's HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/containers", post(create_container).get(list_containers))
        .route("/api/containers/{vm_id}/access", get(container_access))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /healthz` — unauthenticated liveness probe.
async fn healthz() -> &'static str {
    "ok"
}

/// Check the shared-secret header; any mismatch is a generic 401.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    // An unset secret must fail closed, not open.
    if !state.webhook_token.is_empty() && constant_time_str_eq(presented, &state.webhook_token) {
        return Ok(());
    }

    warn!("Rejected webhook call with missing or invalid token");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response())
}

/// `POST /api/containers` — provision webhook.
async fn create_container(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid request body",
                    "detail": rejection.body_text(),
                })),
            )
                .into_response();
        }
    };

    match state.provisioner.create_container(request).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => error_response(&state, &e),
    }
}

/// `GET /api/containers` — operator-facing listing.
async fn list_containers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    match state.provisioner.list_containers().await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => error_response(&state, &e),
    }
}

/// `GET /api/containers/{vm_id}/access` — credential retrieval.
async fn container_access(
    State(state): State<AppState>,
    Path(vm_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    match state.provisioner.get_access(&vm_id).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(e) => error_response(&state, &e),
    }
}

/// Map orchestrator errors onto HTTP responses.
///
/// Validation failures carry structured detail; infrastructure failures are
/// a generic message unless dev errors are enabled, so hypervisor internals
/// never leak to callers in production.
fn error_response(state: &AppState, err: &ProvisionError) -> Response {
    let (status, body) = match err {
        ProvisionError::Validation { message } => (
            StatusCode::BAD_REQUEST,
            json!({"error": "validation failed", "detail": message}),
        ),
        ProvisionError::NotFound { vm_id } => (
            StatusCode::NOT_FOUND,
            json!({"error": "container not found", "vm_id": vm_id}),
        ),
        ProvisionError::NotReady { vm_id, status } => (
            StatusCode::CONFLICT,
            json!({"error": "container not ready", "vm_id": vm_id, "status": status}),
        ),
        ProvisionError::Provisioning(_) | ProvisionError::Store(_) => {
            error!(error = %err, "Provisioning request failed");
            let body = if state.dev_errors {
                json!({"error": err.to_string()})
            } else {
                json!({"error": "internal error"})
            };
            (StatusCode::INTERNAL_SERVER_ERROR, body)
        }
    };
    (status, Json(body)).into_response()
}
