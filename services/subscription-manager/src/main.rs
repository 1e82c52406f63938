//! Subscription Worker
//!
//! Boots a subscription manager with the Binance provider, subscribes to
//! tickers for `WORKER_PAIRS` and logs every normalized message until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use subscription_manager::provider::binance::BINANCE_PROVIDER_ID;
use subscription_manager::{
    BinanceConfig, BinanceProvider, ManagerConfig, Subscription, SubscriptionManager,
};
use tokio::sync::watch;
use tracing::{Dispatch, error, info};
use tracing_subscriber::layer::SubscriberExt;

const SERVICE_NAME: &str = "subscription-worker";
const DEFAULT_PAIRS: &str = "BTCUSDT";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let logger = init_tracing()?;
    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let config = ManagerConfig::from_env()?;
    let manager = Arc::new(SubscriptionManager::new(config, logger));
    manager.add_provider(Arc::new(BinanceProvider::new(BinanceConfig::from_env())));

    for pair in worker_pairs() {
        manager.subscribe(Subscription::ticker(
            format!("ticker_{}", pair.to_lowercase()),
            pair,
            BINANCE_PROVIDER_ID,
        ));
    }

    manager.on_message(|message| match serde_json::to_string(&message) {
        Ok(json) => info!("received message {}", json),
        Err(e) => error!("Failed to encode message: {}", e),
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C, stopping after the current tick");
        cancel_tx.send_replace(true);
    });

    manager.start(Some(cancel_rx))?.await?;

    info!("{} shutdown complete", SERVICE_NAME);
    Ok(())
}

/// Build the log pipeline; the manager gets it explicitly, the worker itself
/// logs through the global default
fn init_tracing() -> Result<Dispatch> {
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,subscription_manager=info",
                    SERVICE_NAME.replace('-', "_")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer());

    let logger = Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(logger.clone())
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;
    Ok(logger)
}

fn worker_pairs() -> Vec<String> {
    std::env::var("WORKER_PAIRS")
        .unwrap_or_else(|_| DEFAULT_PAIRS.to_string())
        .split(',')
        .map(|pair| pair.trim().to_uppercase())
        .filter(|pair| !pair.is_empty())
        .collect()
}
