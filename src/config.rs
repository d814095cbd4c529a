use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TREASURY_API_URL: &str =
    "https://api.fiscaldata.treasury.gov/services/api/fiscal_service/v1/accounting/od/rates_of_exchange";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub kafka: KafkaConfig,
    pub publish_max_retries: u32,
    pub publish_retry_delay: Duration,
    pub publisher_drain_timeout: Duration,
    pub subscriber_poll_timeout: Duration,
    pub treasury_api_url: String,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_var("SERVER_PORT", 8080)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 25)?,
            migrations_dir: env::var("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./migrations")),
            kafka: KafkaConfig {
                brokers: env::var("KAFKA_BROKERS").context("KAFKA_BROKERS must be set")?,
                topic: env::var("KAFKA_TOPIC").unwrap_or_else(|_| "transactions".to_string()),
                group_id: env::var("KAFKA_GROUP_ID")
                    .unwrap_or_else(|_| "transaction-completion".to_string()),
                client_id: env::var("KAFKA_CLIENT_ID")
                    .unwrap_or_else(|_| "purchase-core".to_string()),
            },
            publish_max_retries: parse_var("PUBLISH_MAX_RETRIES", 3)?,
            publish_retry_delay: Duration::from_millis(parse_var("PUBLISH_RETRY_DELAY_MS", 500)?),
            publisher_drain_timeout: Duration::from_secs(parse_var(
                "PUBLISHER_DRAIN_TIMEOUT_SECS",
                15,
            )?),
            subscriber_poll_timeout: Duration::from_millis(parse_var(
                "SUBSCRIBER_POLL_TIMEOUT_MS",
                100,
            )?),
            treasury_api_url: env::var("TREASURY_API_URL")
                .unwrap_or_else(|_| DEFAULT_TREASURY_API_URL.to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|raw| parse_list(&raw))
                .filter(|origins| !origins.is_empty()),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_default()
                .parse()?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        _ => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
