//! SOAP entity endpoint binary.
//!
//! Run with: `soap-entity-endpoint --config config.yaml`

use anyhow::{Context, Result};
use clap::Parser;
use soap_entity_endpoint::{
    EndpointConfig, EndpointDispatcher, EntityEndpoint, InMemoryEntityStore, SoapServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// SOAP endpoint answering entity lookups by id.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overrides `server.listen_address`
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting SOAP entity endpoint v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let mut config: EndpointConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        EndpointConfig::default()
    };
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }
    config.validate().context("Invalid configuration")?;

    let mut store = InMemoryEntityStore::from_records(config.store.entities.clone())
        .context("Invalid inline entities")?;
    if let Some(ref seed_file) = config.store.seed_file {
        let records = soap_entity_endpoint::store::read_seed_file(seed_file)
            .with_context(|| format!("Failed to load seed file {}", seed_file.display()))?;
        store.extend(records).context("Invalid seed file entities")?;
    }

    info!(
        entities = store.len(),
        namespace = %config.service.namespace,
        operation = %config.service.request_element,
        ws_security = config.ws_security.enabled,
        "Configuration loaded"
    );

    let mut dispatcher = EndpointDispatcher::new(config.clone());
    EntityEndpoint::new(Arc::new(store)).register(&mut dispatcher, &config.service);

    let listener = TcpListener::bind(&config.server.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_address))?;

    SoapServer::new(Arc::new(dispatcher))
        .run(listener)
        .await
        .context("HTTP server error")?;

    info!("SOAP entity endpoint stopped");
    Ok(())
}
