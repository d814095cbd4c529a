pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod messaging;
pub mod metrics;
pub mod openapi;
pub mod ports;
pub mod services;
pub mod startup;
pub mod treasury;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::health::HealthChecks;
use crate::messaging::{MessagePublisher, SubscriberHandle, TransportError};
use crate::services::{CurrencyService, TransactionService};

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub currency: CurrencyService,
    pub health: HealthChecks,
    pub metrics: PrometheusHandle,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/transactions",
            get(handlers::transactions::list_transactions)
                .post(handlers::transactions::create_transaction),
        )
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route(
            "/transactions/:id/status",
            patch(handlers::transactions::update_transaction_status),
        )
        .route(
            "/transactions/:id/convert",
            get(handlers::currency::convert_transaction),
        )
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Restricts cross-origin calls to `origins`; entries that are not valid
/// header values are dropped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Stops the background pipeline: the subscriber first, so nothing consumes
/// while the publisher drains, then the publisher within `drain_timeout`.
pub async fn stop_pipeline(
    subscriber: SubscriberHandle,
    publisher: &dyn MessagePublisher,
    drain_timeout: Duration,
) -> Result<(), TransportError> {
    match subscriber.stop().await {
        Ok(Ok(stats)) => tracing::info!(
            handled = stats.handled,
            skipped = stats.skipped,
            failed = stats.failed,
            "Subscriber drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Subscriber ended with transport error"),
        Err(e) => tracing::error!(error = %e, "Subscriber task panicked"),
    }

    publisher.close(drain_timeout).await.map_err(|e| {
        tracing::warn!(error = %e, "Publisher closed with undelivered messages");
        e
    })
}
