use axum::extract::State;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::AppState;

pub const MESSAGES_PUBLISHED: &str = "kafka_messages_published_total";
pub const MESSAGE_PUBLISH_ERRORS: &str = "kafka_messages_publish_errors_total";
pub const MESSAGES_PROCESSED: &str = "kafka_messages_processed_total";

/// Installs the process-wide Prometheus recorder. Call once.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_pipeline();
    Ok(handle)
}

/// A handle that is not installed globally; renders nothing. For wiring
/// routers in tests.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn describe_pipeline() {
    ::metrics::describe_counter!(MESSAGES_PUBLISHED, "The total number of published messages");
    ::metrics::describe_counter!(
        MESSAGE_PUBLISH_ERRORS,
        "The total number of message publish errors"
    );
    ::metrics::describe_counter!(MESSAGES_PROCESSED, "The total number of processed messages");
}

pub fn record_published() {
    ::metrics::counter!(MESSAGES_PUBLISHED).increment(1);
}

pub fn record_publish_error() {
    ::metrics::counter!(MESSAGE_PUBLISH_ERRORS).increment(1);
}

pub fn record_processed() {
    ::metrics::counter!(MESSAGES_PROCESSED).increment(1);
}

/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
