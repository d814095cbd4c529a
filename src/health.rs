use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::messaging::{CompletionMessage, MessagePublisher};
use crate::ports::TransactionRepository;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[schema(value_type = Object)]
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

/// Round-trips the transaction store.
pub struct RepositoryChecker {
    repository: Arc<dyn TransactionRepository>,
}

impl RepositoryChecker {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl DependencyChecker for RepositoryChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.repository.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

/// Publishes a probe message; the subscriber commits it without side effects.
pub struct QueueChecker {
    publisher: Arc<dyn MessagePublisher>,
}

impl QueueChecker {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl DependencyChecker for QueueChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.publisher.publish(&CompletionMessage::probe()).await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

#[derive(Clone)]
pub struct HealthChecks {
    postgres: Arc<dyn DependencyChecker>,
    queue: Arc<dyn DependencyChecker>,
    start_time: Instant,
}

impl HealthChecks {
    pub fn new(postgres: Arc<dyn DependencyChecker>, queue: Arc<dyn DependencyChecker>) -> Self {
        Self {
            postgres,
            queue,
            start_time: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthResponse {
        let (postgres_result, queue_result) = tokio::join!(
            timeout(CHECK_TIMEOUT, self.postgres.check()),
            timeout(CHECK_TIMEOUT, self.queue.check())
        );

        let mut dependencies = HashMap::new();
        dependencies.insert(
            "postgres".to_string(),
            postgres_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
        );
        dependencies.insert(
            "queue".to_string(),
            queue_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
        );

        HealthResponse {
            status: determine_overall_status(&dependencies),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let critical_deps = ["postgres"];
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
