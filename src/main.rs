//! Mortgage calculator HTTP server.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mortgage_calc::config::ServerConfig;
use mortgage_calc::{MortgageCalculator, RateLedger, server};

fn init_tracing(log_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;
    init_tracing(&config.log_filter);

    tracing::info!("Mortgage calculator v{}", mortgage_calc::VERSION);
    tracing::info!(
        host = %config.host,
        port = config.port,
        default_rate = %config.default_rate,
        "Server configuration loaded"
    );

    let ledger = RateLedger::seeded(config.default_rate)?;
    let calculator = Arc::new(MortgageCalculator::new(ledger));

    server::serve(&config, calculator).await
}
