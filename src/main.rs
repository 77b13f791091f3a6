use anyhow::Result;
use std::sync::Arc;
use storefront_translations::config::Config;
use storefront_translations::scheduler;
use storefront_translations::server::{self, ApiState};
use storefront_translations::service::TranslationService;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storefront_translations=info".parse()?),
        )
        .init();

    info!("Starting storefront translation service");

    // Load configuration from environment
    let config = Config::from_env()?;

    let service = Arc::new(TranslationService::from_config(&config).await?);
    service.start().await;

    let mut jobs = scheduler::start_scheduler(Arc::clone(&service), &config).await?;

    let state = ApiState::new(Arc::clone(&service), config.admin_api_key.clone());
    server::serve(state, config.port, shutdown_signal()).await?;

    info!("Shutting down");
    if let Err(e) = jobs.shutdown().await {
        error!("Failed to stop scheduler: {}", e);
    }
    service.shutdown().await?;

    info!("✓ Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
