//! cms-api — HTTP surface of the exporter.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Scrape every account and render Prometheus exposition |
//! | GET | `/api/v1/namespaces` | Supported namespaces with descriptions |
//! | GET | `/api/v1/accounts` | Configured account identifiers |
//! | GET | `/api/v1/accounts/{account}/meta` | Discoverable metrics per namespace |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use cms_client::CmsApi;
use cms_metrics::Exporter;

/// Shared state for API handlers.
pub struct ApiState<A> {
    pub exporter: Arc<Exporter<A>>,
}

impl<A> Clone for ApiState<A> {
    fn clone(&self) -> Self {
        Self {
            exporter: self.exporter.clone(),
        }
    }
}

/// Build the complete router.
pub fn build_router<A: CmsApi + 'static>(exporter: Arc<Exporter<A>>) -> Router {
    let state = ApiState { exporter };

    let api_routes = Router::new()
        .route("/namespaces", get(handlers::list_namespaces::<A>))
        .route("/accounts", get(handlers::list_accounts::<A>))
        .route("/accounts/{account}/meta", get(handlers::describe_meta::<A>))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics::<A>).with_state(state))
        .route("/healthz", get(handlers::healthz))
}
