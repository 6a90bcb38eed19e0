use crate::{
    cache::ResultCache,
    config::AppConfig,
    error::{Result, ServiceError},
    export,
    filter::FilterSelection,
    models::AggregateBundle,
    query::FetchEngine,
    session::{Dashboard, RenderOutcome, Trigger, ViewState},
    state::AppState,
    store::{ConnectionProvider, Executor, SqlStatementProvider},
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub fn new(config: AppConfig) -> Self {
        let provider = Arc::new(SqlStatementProvider::new(&config));
        Self::with_provider(config, provider)
    }

    /// Boot against a substitute store; the seam the tests use.
    pub fn with_provider(config: AppConfig, provider: Arc<dyn ConnectionProvider>) -> Self {
        let executor = Arc::new(Executor::new(provider, config.store_retries));
        let engine = Arc::new(FetchEngine::new(executor, config.store_schema.clone()));
        let cache = ResultCache::new(engine, config.filter_options_ttl);
        let dashboard = Arc::new(Dashboard::new(cache));
        let config = Arc::new(config);
        let state = AppState::new(Arc::clone(&config), dashboard);

        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/api/filters", get(Self::filters))
            .route("/api/render", post(Self::render))
            .route("/api/views/vulnerabilities", post(Self::vulnerabilities))
            .route("/api/session", axum::routing::delete(Self::end_session))
            .route("/api/export/organizations.csv", get(Self::organizations_csv))
            .route("/api/export/uid-examples.csv", get(Self::uid_examples_csv))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "fleetscope listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn filters(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>> {
        enforce_api_key(&headers, &state.config)?;
        let options = state.dashboard.filter_options().await;
        Ok(Json(serde_json::to_value(&*options).map_err(|err| {
            ServiceError::Internal(err.into())
        })?))
    }

    async fn render(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<RenderRequest>,
    ) -> Result<Json<RenderResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let (session_id, session) = state.sessions.resolve(session_id(&headers));
        let mut session = session.lock().await;

        let outcome = state
            .dashboard
            .render(&mut session, request.selection.clone(), request.trigger)
            .await;

        let (notice, include_bundles) = match outcome {
            RenderOutcome::Empty => (
                Some("No data found for the selected filters.".to_string()),
                false,
            ),
            RenderOutcome::AwaitingSelection => (
                Some("Select filters and apply to load data.".to_string()),
                false,
            ),
            RenderOutcome::Fetched | RenderOutcome::Reused => (None, true),
        };

        Ok(Json(RenderResponse {
            session: session_id,
            state: session.state,
            outcome,
            selection: session.selection.clone(),
            active_filters: session.selection.active_count(),
            notice,
            global: include_bundles.then(|| session.global.as_ref().clone()),
            risk: include_bundles.then(|| session.risk.as_ref().clone()),
        }))
    }

    async fn vulnerabilities(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<Json<VulnerabilitiesResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let (session_id, session) = state.sessions.resolve(session_id(&headers));
        let mut session = session.lock().await;

        let bundle = state.dashboard.vulnerabilities_visible(&mut session).await;
        Ok(Json(VulnerabilitiesResponse {
            session: session_id,
            vulnerabilities: bundle.as_ref().clone(),
        }))
    }

    async fn end_session(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<StatusCode> {
        enforce_api_key(&headers, &state.config)?;
        if let Some(id) = session_id(&headers) {
            state.sessions.discard(id);
        }
        Ok(StatusCode::NO_CONTENT)
    }

    async fn organizations_csv(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<impl IntoResponse> {
        enforce_api_key(&headers, &state.config)?;
        let (_, session) = state.sessions.resolve(session_id(&headers));
        let session = session.lock().await;

        let csv = export::organizations_csv(&session.global).ok_or_else(|| {
            ServiceError::InvalidRequest("no organization distribution loaded".into())
        })?;
        Ok(csv_response(csv, "organizations_device_count.csv"))
    }

    async fn uid_examples_csv(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<impl IntoResponse> {
        enforce_api_key(&headers, &state.config)?;
        let (_, session) = state.sessions.resolve(session_id(&headers));
        let session = session.lock().await;

        let table = state.dashboard.uid_examples(&session).await;
        Ok(csv_response(export::table_to_csv(&table), "uid_examples.csv"))
    }
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub selection: FilterSelection,
    pub trigger: Trigger,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub session: Uuid,
    pub state: ViewState,
    pub outcome: RenderOutcome,
    /// Snapshot of the last-applied selection the bundles were built for.
    pub selection: FilterSelection,
    pub active_filters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<AggregateBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<AggregateBundle>,
}

#[derive(Debug, Serialize)]
pub struct VulnerabilitiesResponse {
    pub session: Uuid,
    pub vulnerabilities: AggregateBundle,
}

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn csv_response(csv: String, filename: &str) -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    )
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}
