//! Leads dashboard backend
//!
//! Read-only reports over the `leads` and `leads_contatos` tables, served to
//! the dashboard as JSON.
//!
//! - **Filters**: query-string filters turned into a parameterized WHERE clause
//! - **Reports**: list, metrics and four chart aggregates, one code path
//! - **Store**: one Postgres connection per request, released on every exit
//! - **Routes**: the axum router used by both the local server and Lambda

pub mod config;
pub mod error;
pub mod filter;
pub mod report;
pub mod routes;
pub mod store;

#[cfg(test)]
mod report_test;

pub use config::{ConnectionSettings, DbConfig, ErrorPolicy, ServerConfig};
pub use error::{ApiError, LeadsError};
pub use filter::{build_query_context, FilterContext, LeadFilters, LeadTable};
pub use report::{run_report, Report, ReportBody};
pub use routes::{build_router, AppState};
pub use store::{probe_connection, store_from_env, LeadStore, PgStore, Row, UnconfiguredStore};
