pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod models;
pub mod query;
pub mod server;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the fleetscope service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).run().await
}
