use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_statsd::StatsdBuilder;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;

use api::ApiState;
use config::{Config, ConfigError, StoreConfig};
use crm::{CrmClient, OAuthTokenProvider};
use tracking::{CaseStore, MemoryStore, PostgresStore, StoreError};
use worker::coordinator::Coordinator;
use worker::dispatcher::Dispatcher;
use worker::publisher::{EventPublisher, NoopPublisher, WebhookPublisher};
use worker::{Consumer, MemoryQueue};

#[derive(Parser)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the synchronous case-creation API.
    Api,
    /// Run the queue worker over the in-process queue. Production
    /// transports implement QueueSource and replace the queue here.
    Worker,
}

/// Stand-in for the transport's visibility timeout on the in-process
/// queue.
const REDELIVERY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error("api mode requires an [api] config section")]
    MissingApiConfig,

    #[error("could not bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

fn init_observability(config: &Config) -> Result<Option<sentry::ClientInitGuard>, StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Some(metrics_config) = &config.common.metrics {
        let recorder = StatsdBuilder::from(
            metrics_config.statsd_host.clone(),
            metrics_config.statsd_port,
        )
        .build(Some("caseflow"))
        .map_err(|err| StartupError::Metrics(err.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|err| StartupError::Metrics(err.to_string()))?;
    }

    let guard = config.common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    Ok(guard)
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn CaseStore>, StartupError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Postgres { url } => {
            let store = PostgresStore::connect(url).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

fn build_coordinator(config: &Config, store: Arc<dyn CaseStore>) -> Coordinator {
    let gateway = Arc::new(CrmClient::new(config.crm.base_url.clone()));
    let tokens = Arc::new(OAuthTokenProvider::new(config.crm.auth.clone()));
    let events: Arc<dyn EventPublisher> = match &config.worker.events {
        Some(events) => Arc::new(WebhookPublisher::new(events.webhook_url.clone())),
        None => Arc::new(NoopPublisher),
    };

    Coordinator::new(store, gateway, tokens, events)
}

async fn run_api(config: Config) -> Result<(), StartupError> {
    let api_config = config.api.as_ref().ok_or(StartupError::MissingApiConfig)?;
    let listen_addr = api_config.listen_addr;
    let api_key = api_config.api_key.clone();

    let store = build_store(&config.store).await?;
    let coordinator = Arc::new(build_coordinator(&config, store.clone()));

    let app = api::router(ApiState {
        coordinator,
        store,
        api_key,
    });

    info!(%listen_addr, "api listening");
    let listener = TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_worker(config: Config) -> Result<(), StartupError> {
    let store = build_store(&config.store).await?;
    let coordinator = build_coordinator(&config, store);
    let dispatcher = Arc::new(Dispatcher::new(
        coordinator,
        config.worker.retry_metadata_failures,
    ));

    // In-process queue for local runs; external transports plug in behind
    // QueueSource. The redelivery tick stands in for a visibility timeout
    // so retained messages come back around.
    let queue = Arc::new(MemoryQueue::new());
    let redelivery_queue = queue.clone();
    tokio::spawn(async move {
        redelivery_queue.run_redelivery(REDELIVERY_INTERVAL).await;
    });

    let consumer = Consumer::new(
        queue,
        dispatcher,
        config.worker.batch_size,
        config.worker.poll_interval(),
    );

    consumer.run().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let _sentry_guard = init_observability(&config)?;

    match cli.command {
        CliCommand::Api => run_api(config).await,
        CliCommand::Worker => run_worker(config).await,
    }
}
