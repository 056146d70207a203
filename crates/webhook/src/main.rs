//! Rightsize webhook - admission-time resource right-sizing
//!
//! This binary runs as a Deployment behind a MutatingWebhookConfiguration,
//! rewriting pod resources from the workload statistics backend.

use anyhow::Result;
use rightsize_lib::{
    health::components, HealthRegistry, HttpFetcher, PodMutator, ReqwestFetcher,
    RightsizeMetrics, StructuredLogger,
};
use rightsize_webhook::{api, config::WebhookConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const WEBHOOK_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting rightsize-webhook");

    let config = WebhookConfig::load()?;
    info!(
        port = config.port,
        stats_url = %config.stats_url,
        excluded_namespaces = ?config.excluded_namespaces,
        "Webhook configured"
    );

    // The blocking client must be created and dropped outside the runtime,
    // so this handle outlives it
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new(config.stats_timeout())?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(config, fetcher.clone()));
    drop(runtime);

    result
}

async fn run(config: WebhookConfig, fetcher: Arc<dyn HttpFetcher>) -> Result<()> {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STATS_BACKEND).await;
    health_registry.register(components::ADMISSION).await;

    let metrics = RightsizeMetrics::new();

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(WEBHOOK_VERSION, &config.stats_url);

    let mutator = PodMutator::new(config.mutator_config()?, fetcher).with_logger(logger.clone());
    let app_state = Arc::new(api::AppState::new(
        mutator,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(config.port, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
