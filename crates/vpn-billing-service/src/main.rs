//! VPN billing service entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpn_billing_service::{create_router, AppState, AutopayScheduler, ServiceConfig};
use vpn_billing_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vpn_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VPN billing service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        provisioning_configured = %config.provisioning_api_url.is_some(),
        webhook_secret_configured = %config.payment_webhook_secret.is_some(),
        "Service configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    // Build app state
    let state = Arc::new(AppState::new(store, config.clone()));

    // Start the autopay/expiry sweep
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = AutopayScheduler::new(Arc::clone(&state), shutdown_rx);
    let scheduler_task = tokio::spawn(scheduler.run());

    // Create the router
    let app = create_router(state.as_ref().clone());
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop the sweep and wait for the in-flight account to finish
    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;

    Ok(())
}
