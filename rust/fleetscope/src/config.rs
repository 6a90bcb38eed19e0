use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Hostname of the analytical SQL warehouse.
    pub store_host: String,
    /// HTTP path of the warehouse endpoint, e.g. `/sql/statements/v1`.
    pub store_http_path: String,
    /// Bearer token presented to the warehouse.
    pub store_token: Option<String>,
    /// Schema qualifier prepended to every table name.
    pub store_schema: String,
    /// How many times a failed query is retried after a connection reset.
    pub store_retries: u32,
    pub store_timeout: Duration,
    pub api_key: Option<String>,
    pub filter_options_ttl: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    fleetscope_listen_addr: Option<String>,
    #[serde(default)]
    fleetscope_listen_host: Option<String>,
    #[serde(default)]
    fleetscope_listen_port: Option<u16>,
    #[serde(default)]
    fleetscope_store_host: Option<String>,
    #[serde(default)]
    fleetscope_store_http_path: Option<String>,
    #[serde(default)]
    fleetscope_store_token: Option<String>,
    #[serde(default = "default_schema")]
    fleetscope_store_schema: String,
    #[serde(default = "default_retries")]
    fleetscope_store_retries: u32,
    #[serde(default = "default_timeout_secs")]
    fleetscope_store_timeout_secs: u64,
    #[serde(default)]
    fleetscope_api_key: Option<String>,
    #[serde(default = "default_options_ttl_secs")]
    fleetscope_filter_options_ttl_secs: u64,
}

fn default_schema() -> String {
    "fleet_analytics".to_string()
}

const fn default_retries() -> u32 {
    1
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_options_ttl_secs() -> u64 {
    3600
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse FLEETSCOPE_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.fleetscope_listen_addr,
            raw.fleetscope_listen_host,
            raw.fleetscope_listen_port,
        )?;

        let store_host = raw
            .fleetscope_store_host
            .or_else(|| env::var("FLEETSCOPE_STORE_HOST").ok())
            .context("FLEETSCOPE_STORE_HOST must be set")?;

        let store_http_path = raw
            .fleetscope_store_http_path
            .context("FLEETSCOPE_STORE_HTTP_PATH must be set")?;

        Ok(Self {
            listen_addr,
            store_host,
            store_http_path,
            store_token: raw.fleetscope_store_token,
            store_schema: raw.fleetscope_store_schema,
            store_retries: raw.fleetscope_store_retries,
            store_timeout: Duration::from_secs(raw.fleetscope_store_timeout_secs.max(1)),
            api_key: raw.fleetscope_api_key,
            filter_options_ttl: Duration::from_secs(raw.fleetscope_filter_options_ttl_secs.max(1)),
        })
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid FLEETSCOPE_LISTEN_ADDR value")?
            .next()
            .context("FLEETSCOPE_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid fleetscope listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
