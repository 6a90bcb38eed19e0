//! In-memory store fakes and a router harness for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use fleetscope::{
    cache::ResultCache,
    config::AppConfig,
    query::FetchEngine,
    server::Server,
    session::Dashboard,
    store::{ConnectionProvider, Executor, Row, StoreConnection, Value},
};
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU32, Ordering},
    sync::Arc,
    time::Duration,
};

pub const API_KEY: &str = "test-api-key";

/// A scripted analytical store: canned result sets matched by SQL
/// substrings, with failure injection and a full query log.
#[derive(Default)]
pub struct FakeStore {
    rules: Mutex<Vec<Rule>>,
    queries: Mutex<Vec<String>>,
    failures: AtomicU32,
}

struct Rule {
    needles: Vec<&'static str>,
    rows: Vec<Row>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a canned result for any query containing all `needles`.
    /// Unmatched queries return zero rows.
    pub fn on(&self, needles: &[&'static str], rows: Vec<Row>) {
        self.rules.lock().push(Rule {
            needles: needles.to_vec(),
            rows,
        });
    }

    /// Make the next `count` queries fail with a transient error.
    pub fn fail_times(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries_containing(&self, needle: &str) -> usize {
        self.queries
            .lock()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }
}

#[async_trait]
impl StoreConnection for FakeStore {
    async fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        self.queries.lock().push(sql.to_string());

        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("transient store failure");
        }

        let rules = self.rules.lock();
        let rows = rules
            .iter()
            .find(|rule| rule.needles.iter().all(|needle| sql.contains(needle)))
            .map(|rule| rule.rows.clone())
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Hands out the shared fake store and counts connection requests.
pub struct FakeProvider {
    pub store: Arc<FakeStore>,
    pub connects: AtomicU32,
}

impl FakeProvider {
    pub fn new(store: Arc<FakeStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            connects: AtomicU32::new(0),
        })
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".parse().expect("test listen addr"),
        store_host: "warehouse.test".to_string(),
        store_http_path: "/sql/statements".to_string(),
        store_token: None,
        store_schema: "fleet_analytics".to_string(),
        store_retries: 1,
        store_timeout: Duration::from_secs(5),
        api_key: Some(API_KEY.to_string()),
        filter_options_ttl: Duration::from_secs(3600),
    }
}

/// A dashboard wired to the fake store, for driving the sequencer
/// directly.
pub fn dashboard(store: Arc<FakeStore>) -> (Dashboard, Arc<FakeProvider>) {
    let provider = FakeProvider::new(store);
    let executor = Arc::new(Executor::new(provider.clone(), 1));
    let engine = Arc::new(FetchEngine::new(executor, "fleet_analytics".to_string()));
    let cache = ResultCache::new(engine, Duration::from_secs(3600));
    (Dashboard::new(cache), provider)
}

/// A booted router over the fake store, for driving the HTTP surface.
pub fn router(store: Arc<FakeStore>) -> axum::Router {
    let provider = FakeProvider::new(store);
    Server::with_provider(test_config(), provider).router()
}

/// Build an authenticated request against the test router.
pub fn api_request(
    method: &str,
    uri: &str,
    session: Option<uuid::Uuid>,
    body: Option<serde_json::Value>,
) -> http::Request<axum::body::Body> {
    let mut builder = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    if let Some(session) = session {
        builder = builder.header("x-session-id", session.to_string());
    }

    match body {
        Some(body) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .expect("request body"),
        None => builder
            .body(axum::body::Body::empty())
            .expect("request body"),
    }
}

pub async fn read_json(
    response: http::Response<axum::body::Body>,
) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

pub async fn read_text(
    response: http::Response<axum::body::Body>,
) -> (http::StatusCode, http::HeaderMap, String) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub fn int(value: i64) -> Value {
    Value::Int(value)
}

/// Seed the store with a small but fully populated fleet: every Global
/// and Risk result name yields at least one row.
pub fn seed_fleet(store: &FakeStore) {
    store.on(
        &["GROUP BY vendor, device_type_family, model", "LIMIT 5000"],
        vec![
            vec![text("Acme"), text("Camera"), text("AX-1"), int(50)],
            vec![text("Acme"), text("Sensor"), text("AX-2"), int(30)],
            vec![text("Globex"), text("Camera"), text("GX-9"), int(20)],
        ],
    );
    store.on(
        &["GROUP BY device_subcategory"],
        vec![vec![text("IP Camera"), int(60)], vec![text("Thermostat"), int(40)]],
    );
    store.on(
        &["GROUP BY device_category"],
        vec![vec![text("IoT"), int(70)], vec![text("IT"), int(30)]],
    );
    store.on(
        &["GROUP BY os_name"],
        vec![vec![text("Linux"), int(80)], vec![text("RTOS"), int(20)]],
    );
    store.on(
        &["GROUP BY vendor", "LIMIT 20"],
        vec![vec![text("Acme"), int(80)], vec![text("Globex"), int(20)]],
    );
    store.on(&["SELECT COUNT(*) AS total_count"], vec![vec![int(100)]]);
    store.on(
        &["explode(all_seen_sources)"],
        vec![vec![text("netflow"), int(90)], vec![text("dhcp"), int(75)]],
    );
    store.on(
        &["GROUP BY organization"],
        vec![vec![text("Initech"), int(60)], vec![text("Hooli"), int(40)]],
    );
    store.on(
        &["GROUP BY risk_score"],
        vec![
            vec![text("Low"), int(70)],
            vec![text("Medium"), int(20)],
            vec![text("Critical"), int(10)],
        ],
    );
    store.on(
        &["risk_score = 'Critical'"],
        vec![vec![text("Acme"), text("Camera"), text("AX-1"), int(10)]],
    );
    store.on(
        &["risk_score = 'High'"],
        vec![vec![text("Acme"), text("Sensor"), text("AX-2"), int(5)]],
    );
    store.on(
        &["risk_score = 'Medium'"],
        vec![vec![text("Globex"), text("Camera"), text("GX-9"), int(20)]],
    );
    store.on(
        &["EXPLODE(vulnerabilities_list)"],
        vec![
            vec![text("Confirmed"), text("CVE-2024-0001"), text("nvd"), int(12)],
            vec![text("Confirmed"), text("CVE-2023-1111"), text("vendor"), int(8)],
            vec![
                text("Potentially Relevant"),
                text("CVE-2022-2222"),
                text("nvd"),
                int(5),
            ],
        ],
    );
    store.on(
        &["FROM fleet_analytics.organization_filters"],
        vec![
            vec![
                text("EMEA"),
                text("Healthcare"),
                text("Initech"),
                text("Hospitals"),
                text("active"),
            ],
            vec![
                text("APAC"),
                text("Healthcare"),
                text("Hooli"),
                text("Clinics"),
                text("trial"),
            ],
        ],
    );
    store.on(
        &["FROM fleet_analytics.device_filters"],
        vec![
            vec![
                text("Acme"),
                text("Camera"),
                text("IP Camera"),
                text("IoT"),
                text("AX-1"),
                text("Linux"),
                text("00:1A:2B"),
            ],
            vec![
                text("Globex"),
                text("Camera"),
                text("IP Camera"),
                text("IoT"),
                text("GX-9"),
                text("RTOS"),
                text("AA:BB:CC"),
            ],
        ],
    );
}
