use crate::config::Config;
use crate::messaging::kafka::KafkaPublisher;
use crate::messaging::{CompletionMessage, MessagePublisher};
use anyhow::{Context, Result};
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub queue: bool,
    pub treasury: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.queue && self.treasury
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Queue Connectivity:    {}", status(self.queue));
        println!("Treasury API:          {}", status(self.treasury));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        queue: true,
        treasury: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(config).await {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    if let Err(e) = validate_queue(config).await {
        report.queue = false;
        report.errors.push(format!("Queue: {:#}", e));
    }

    if let Err(e) = validate_treasury(&config.treasury_api_url).await {
        report.treasury = false;
        report.errors.push(format!("Treasury: {:#}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.kafka.brokers.trim().is_empty() {
        anyhow::bail!("KAFKA_BROKERS is empty");
    }
    if config.kafka.topic.trim().is_empty() {
        anyhow::bail!("KAFKA_TOPIC is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.database_max_connections == 0 {
        anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
    }

    url::Url::parse(&config.treasury_api_url).context("TREASURY_API_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(config: &Config) -> Result<()> {
    let pool = crate::db::create_pool(config)
        .await
        .context("Failed to connect to database")?;

    let applied: Result<i64, sqlx::Error> =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
            .fetch_one(&pool)
            .await;
    pool.close().await;

    if applied.context("Failed to check migrations table")? == 0 {
        anyhow::bail!("No migrations applied");
    }
    Ok(())
}

async fn validate_queue(config: &Config) -> Result<()> {
    let publisher = KafkaPublisher::new(&config.kafka)?;
    publisher
        .publish(&CompletionMessage::probe())
        .await
        .context("Failed to enqueue probe message")?;
    publisher
        .close(Duration::from_secs(10))
        .await
        .context("Probe message was not acknowledged")?;
    Ok(())
}

async fn validate_treasury(treasury_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(treasury_url)
        .query(&[("page[size]", "1")])
        .send()
        .await
        .context("Failed to connect to Treasury API")?;

    if !response.status().is_success() {
        anyhow::bail!("Treasury API returned status: {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KafkaConfig, LogFormat, DEFAULT_TREASURY_API_URL};
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            server_port: 8080,
            database_url: "postgres://localhost:5432/purchases".to_string(),
            database_max_connections: 5,
            migrations_dir: PathBuf::from("./migrations"),
            kafka: KafkaConfig {
                brokers: "localhost:9092".to_string(),
                topic: "transactions".to_string(),
                group_id: "transaction-completion".to_string(),
                client_id: "purchase-core".to_string(),
            },
            publish_max_retries: 3,
            publish_retry_delay: Duration::from_millis(500),
            publisher_drain_timeout: Duration::from_secs(15),
            subscriber_poll_timeout: Duration::from_millis(100),
            treasury_api_url: DEFAULT_TREASURY_API_URL.to_string(),
            cors_allowed_origins: None,
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_validate_env_vars_ok() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let mut config = config();
        config.database_url = String::new();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let mut config = config();
        config.treasury_api_url = "not-a-url".to_string();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_missing_brokers() {
        let mut config = config();
        config.kafka.brokers = " ".to_string();
        assert!(validate_env_vars(&config).is_err());
    }
}
