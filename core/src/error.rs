use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};

/// Failures reaching or querying the leads store.
#[derive(Debug, thiserror::Error)]
pub enum LeadsError {
    #[error("database configuration not found: {0}")]
    Config(String),
    #[error("connection failed: {0}")]
    Connect(#[source] tokio_postgres::Error),
    #[error("query failed: {0}")]
    Query(#[source] tokio_postgres::Error),
    #[error("tls setup failed: {0}")]
    Tls(#[from] openssl::error::ErrorStack),
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}

impl LeadsError {
    /// SQLSTATE reported by the server, when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Connect(e) | Self::Query(e) => e.code().map(|state| state.code()),
            _ => None,
        }
    }
}

/// Error bodies returned by the router, always `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Endpoint não encontrado")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    Report(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
