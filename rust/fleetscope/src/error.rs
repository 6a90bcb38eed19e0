use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed")]
    Auth,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport or auth failure talking to the analytical store. Recovered
    /// by the executor's reset-and-retry; surfaces only when retries are
    /// exhausted before a query even ran.
    #[error("store connection failed: {0}")]
    Connection(#[source] anyhow::Error),

    /// A query failed after the retry budget was spent. Caught at the
    /// fetcher boundary and converted into an empty well-shaped bundle.
    #[error("query failed: {0}")]
    Query(#[source] anyhow::Error),

    /// The filter-option lookup failed. Non-fatal: options degrade to
    /// empty sets per field.
    #[error("filter options unavailable: {0}")]
    FilterOptionsUnavailable(#[source] anyhow::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Connection(_)
            | ServiceError::Query(_)
            | ServiceError::FilterOptionsUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !matches!(self, ServiceError::InvalidRequest(_) | ServiceError::Auth) {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
