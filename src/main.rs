use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use purchase_core::adapters::PostgresTransactionRepository;
use purchase_core::cli::{Cli, Commands, DbCommands, TxCommands};
use purchase_core::config::{Config, LogFormat};
use purchase_core::health::{HealthChecks, QueueChecker, RepositoryChecker};
use purchase_core::messaging::kafka::{KafkaMessageSource, KafkaPublisher};
use purchase_core::messaging::Subscriber;
use purchase_core::ports::TransactionRepository;
use purchase_core::services::{CurrencyService, PublishRetryPolicy, TransactionService};
use purchase_core::treasury::TreasuryClient;
use purchase_core::{cli, cors_layer, create_app, db, metrics, stop_pipeline, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Tx(TxCommands::SetStatus { tx_id, status }) => {
            let pool = db::create_pool(&config).await?;
            let result = cli::handle_tx_set_status(&pool, tx_id, &status).await;
            pool.close().await;
            result
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn,rdkafka=warn".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;

    // Database pool
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool, &config.migrations_dir).await?;

    let repository: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let publisher = Arc::new(KafkaPublisher::new(&config.kafka)?);
    let rates = Arc::new(TreasuryClient::new(config.treasury_api_url.clone()));
    tracing::info!("Treasury client initialized with URL: {}", config.treasury_api_url);

    let transactions = TransactionService::new(repository.clone(), publisher.clone())
        .with_retry_policy(PublishRetryPolicy {
            max_retries: config.publish_max_retries,
            delay: config.publish_retry_delay,
        });
    let currency = CurrencyService::new(repository.clone(), rates);
    let health = HealthChecks::new(
        Arc::new(RepositoryChecker::new(repository.clone())),
        Arc::new(QueueChecker::new(publisher.clone())),
    );

    // Completion subscriber
    let source = KafkaMessageSource::new(&config.kafka)?;
    let subscriber = Subscriber::new(source, Arc::new(transactions.clone()))
        .with_poll_timeout(config.subscriber_poll_timeout)
        .spawn();
    let subscriber_exited = subscriber.exited();

    let mut app = create_app(AppState {
        transactions,
        currency,
        health,
        metrics: metrics_handle,
    });
    if let Some(origins) = &config.cors_allowed_origins {
        app = app.layer(cors_layer(origins));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let served = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = subscriber_exited => {
                    tracing::error!("Completion subscriber exited unexpectedly, shutting down");
                }
            }
        })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server stopped with error");
    }

    // Teardown order: subscriber, publisher, pool
    let _ = stop_pipeline(subscriber, publisher.as_ref(), config.publisher_drain_timeout).await;
    pool.close().await;
    tracing::info!("Shutdown complete");

    served.map_err(Into::into)
}

/// Resolves on ctrl+c or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl+c signal, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
