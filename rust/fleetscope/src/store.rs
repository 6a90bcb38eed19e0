//! Connectivity to the analytical store: scalar row values, the
//! connection-provider seam, and the retrying executor that owns the
//! process-wide cached connection.

use crate::{
    config::AppConfig,
    error::{Result, ServiceError},
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub type Row = Vec<Value>;

/// One scalar column value as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Text(s) => s.parse().ok(),
            Value::Null => None,
        }
    }
}

/// An authenticated handle to the store. `query` owns every per-call
/// resource, so each attempt releases on all exit paths.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    async fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>>;
}

/// Hands out connections. The executor re-requests one only after a
/// failure; everything else about the handle is opaque to the core.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreConnection>>;
}

/// Runs query text through a lazily created, process-wide cached
/// connection. The only component allowed to reset that shared handle.
pub struct Executor {
    provider: Arc<dyn ConnectionProvider>,
    cached: Mutex<Option<Arc<dyn StoreConnection>>>,
    retries: u32,
}

impl Executor {
    pub fn new(provider: Arc<dyn ConnectionProvider>, retries: u32) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
            retries,
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        let mut last_err: Option<ServiceError> = None;
        for attempt in 0..=self.retries {
            let failure = match self.connection().await {
                Ok(conn) => match conn.query(sql).await {
                    Ok(rows) => return Ok(rows),
                    Err(err) => ServiceError::Query(err),
                },
                Err(err) => ServiceError::Connection(err),
            };

            if attempt < self.retries {
                warn!(
                    error = %failure,
                    attempt = attempt + 1,
                    "store query failed, resetting connection and retrying"
                );
                self.reset();
            }
            last_err = Some(failure);
        }

        Err(last_err.unwrap_or_else(|| ServiceError::Query(anyhow!("query ran no attempts"))))
    }

    async fn connection(&self) -> anyhow::Result<Arc<dyn StoreConnection>> {
        if let Some(conn) = self.cached.lock().clone() {
            return Ok(conn);
        }

        // Concurrent sessions may race here and connect twice; the extra
        // handle is dropped when the second insert wins and the duplicate
        // reconnect is harmless.
        let conn = self.provider.connect().await?;
        *self.cached.lock() = Some(conn.clone());
        Ok(conn)
    }

    fn reset(&self) {
        self.cached.lock().take();
    }
}

/// HTTP SQL-statement provider for the warehouse endpoint.
pub struct SqlStatementProvider {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl SqlStatementProvider {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            endpoint: format!("https://{}{}", config.store_host, config.store_http_path),
            token: config.store_token.clone(),
            timeout: config.store_timeout,
        }
    }
}

#[async_trait]
impl ConnectionProvider for SqlStatementProvider {
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreConnection>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("fleetscope/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build warehouse HTTP client")?;

        let conn = SqlStatementConnection {
            client,
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
        };

        // One-time connectivity check so bad credentials fail the attempt
        // rather than the first real query.
        conn.query("SELECT 1")
            .await
            .context("warehouse connectivity check failed")?;
        info!(endpoint = %self.endpoint, "warehouse connection established");

        Ok(Arc::new(conn))
    }
}

struct SqlStatementConnection {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
}

#[derive(Deserialize)]
struct StatementResponse {
    status: StatementStatus,
    #[serde(default)]
    result: Option<StatementResult>,
}

#[derive(Deserialize)]
struct StatementStatus {
    state: String,
    #[serde(default)]
    error: Option<StatementErrorBody>,
}

#[derive(Deserialize)]
struct StatementErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    data_array: Vec<Vec<serde_json::Value>>,
}

#[async_trait]
impl StoreConnection for SqlStatementConnection {
    async fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&StatementRequest { statement: sql });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("warehouse request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("warehouse returned status {}", response.status());
        }

        let body: StatementResponse = response
            .json()
            .await
            .context("malformed warehouse response")?;

        if body.status.state != "SUCCEEDED" {
            let message = body
                .status
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| body.status.state.clone());
            anyhow::bail!("statement failed: {message}");
        }

        let rows = body.result.map(|r| r.data_array).unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::from_json).collect())
            .collect())
    }
}
