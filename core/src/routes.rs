//! HTTP routes shared by the local server and the Lambda function.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post, MethodRouter},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ConnectionSettings, ErrorPolicy};
use crate::error::ApiError;
use crate::filter::LeadFilters;
use crate::report::{run_report, Report};
use crate::store::{probe_connection, LeadStore};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "postgres";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeadStore>,
    pub error_policy: ErrorPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn LeadStore>, error_policy: ErrorPolicy) -> Self {
        Self { store, error_policy }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/leads", report_route(Report::Leads))
        .route("/api/leads/metrics", report_route(Report::Metrics))
        .route("/api/leads/charts/timeline", report_route(Report::Timeline))
        .route("/api/leads/charts/origem", report_route(Report::Origin))
        .route("/api/leads/charts/conversao", report_route(Report::Conversion))
        .route(
            "/api/leads/charts/motivos-recusa",
            report_route(Report::DeclineReasons),
        )
        .route("/api/config/test-connection", post(test_connection))
        .route("/api/test", any(health))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Also answers every `OPTIONS` request itself with an empty 200.
fn cors_layer() -> CorsLayer {
    // mirrored rather than `*` so credentials stay allowed
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn report_route(report: Report) -> MethodRouter<AppState> {
    get(
        move |State(state): State<AppState>,
              query: Result<Query<LeadFilters>, QueryRejection>| async move {
            match query {
                Ok(Query(filters)) => serve_report(&state, report, filters).await,
                // unreadable filters (e.g. a repeated key) fail like a query would
                Err(rejection) => {
                    tracing::warn!(
                        report = report.name(),
                        error = %rejection.body_text(),
                        "rejected report filters"
                    );
                    report_failure(&state, report)
                }
            }
        },
    )
}

async fn serve_report(state: &AppState, report: Report, filters: LeadFilters) -> Response {
    match run_report(state.store.as_ref(), report, &filters).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            tracing::error!(
                report = report.name(),
                error = %err,
                code = err.code().unwrap_or("-"),
                "report query failed"
            );
            tracing::debug!(report = report.name(), error = ?err, "report failure detail");

            report_failure(state, report)
        }
    }
}

fn report_failure(state: &AppState, report: Report) -> Response {
    match state.error_policy {
        ErrorPolicy::Fallback => Json(report.fallback()).into_response(),
        ErrorPolicy::Surface => ApiError::Report(report.failure_message()).into_response(),
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ConnectionTestRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl ConnectionTestRequest {
    pub fn into_settings(self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            database: self
                .database
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            user: self.user,
            password: self.password,
            ssl: self.ssl,
        }
    }
}

/// Accepts `5432` as well as `"5432"`.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let port = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(port)
}

async fn test_connection(payload: Result<Json<ConnectionTestRequest>, JsonRejection>) -> Response {
    let settings = match payload {
        Ok(Json(request)) => request.into_settings(),
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "unreadable connection test body");
            return connection_failure(rejection.body_text());
        }
    };

    match probe_connection(&settings).await {
        Ok(()) => {
            tracing::info!(host = %settings.host, port = settings.port, "connection test passed");
            Json(json!({ "success": true })).into_response()
        }
        Err(err) => {
            tracing::error!(
                host = %settings.host,
                port = settings.port,
                error = %err,
                "connection test failed"
            );
            connection_failure(err.to_string())
        }
    }
}

fn connection_failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": error })),
    )
        .into_response()
}

async fn health(uri: Uri) -> Json<Value> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    Json(json!({
        "message": "Backend funcionando!",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "path": path,
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
