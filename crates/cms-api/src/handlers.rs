//! HTTP handlers.
//!
//! JSON endpoints share one response envelope; `/metrics` returns the
//! plain-text exposition.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use cms_client::CmsApi;
use cms_metrics::prometheus::CONTENT_TYPE;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Exposition ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics<A: CmsApi + 'static>(
    State(state): State<ApiState<A>>,
) -> impl IntoResponse {
    let body = state.exporter.render().await;
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

// ── Discovery ──────────────────────────────────────────────────

/// GET /api/v1/namespaces
pub async fn list_namespaces<A: CmsApi + 'static>(
    State(state): State<ApiState<A>>,
) -> impl IntoResponse {
    ApiResponse::ok(state.exporter.catalog().all().clone())
}

/// GET /api/v1/accounts
pub async fn list_accounts<A: CmsApi + 'static>(
    State(state): State<ApiState<A>>,
) -> impl IntoResponse {
    ApiResponse::ok(state.exporter.accounts())
}

/// GET /api/v1/accounts/:account/meta?namespace=a&namespace=b
///
/// Namespaces may also be comma separated. None means all.
pub async fn describe_meta<A: CmsApi + 'static>(
    State(state): State<ApiState<A>>,
    Path(account): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let Some(client) = state.exporter.client(&account) else {
        return error_response("account not found", StatusCode::NOT_FOUND).into_response();
    };

    let namespaces: Vec<String> = params
        .into_iter()
        .filter(|(k, _)| k == "namespace")
        .flat_map(|(_, v)| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect();

    match client.describe_metric_meta_list(&namespaces).await {
        Ok(meta) => ApiResponse::ok(meta).into_response(),
        Err(e) => {
            warn!(%account, error = %e, "metric meta discovery failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
    }
}
