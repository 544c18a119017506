//! The store seam and its Postgres implementation.
//!
//! Nothing is pooled: every `fetch` opens a [`Session`], runs one statement
//! and closes it again. A session dropped without `close` aborts its driver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use postgres_types::{to_sql_checked, Format, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::config::{ConnectionSettings, DbConfig};
use crate::error::LeadsError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Connect timeout used by the connection test.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Runs a single statement with `params` bound to `$1..$n`.
    async fn fetch(&self, sql: &str, params: &[String]) -> Result<Vec<Row>, LeadsError>;
}

/// Builds the store for this process, degrading to [`UnconfiguredStore`]
/// when no credentials are set.
pub fn store_from_env() -> Arc<dyn LeadStore> {
    match DbConfig::from_env() {
        Ok(config) => Arc::new(PgStore::new(config)),
        Err(err) => {
            tracing::error!(error = %err, "no database configuration found");
            Arc::new(UnconfiguredStore::new(err))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    config: DbConfig,
}

impl PgStore {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    async fn session(&self) -> Result<Session, LeadsError> {
        let mut pg = self.config.to_pg_config()?;
        Session::open(&mut pg, self.config.ssl()).await
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn fetch(&self, sql: &str, params: &[String]) -> Result<Vec<Row>, LeadsError> {
        let session = self.session().await?;

        let bound: Vec<TextParam<'_>> = params.iter().map(|p| TextParam(p.as_str())).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let result = session.client.query(sql, &refs).await;
        session.close().await;
        let rows = result.map_err(LeadsError::Query)?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Fails every fetch with the configuration error captured at startup.
#[derive(Debug, Clone)]
pub struct UnconfiguredStore {
    reason: String,
}

impl UnconfiguredStore {
    pub fn new(err: LeadsError) -> Self {
        let reason = match err {
            LeadsError::Config(reason) => reason,
            other => other.to_string(),
        };
        Self { reason }
    }
}

#[async_trait]
impl LeadStore for UnconfiguredStore {
    async fn fetch(&self, _sql: &str, _params: &[String]) -> Result<Vec<Row>, LeadsError> {
        Err(LeadsError::Config(self.reason.clone()))
    }
}

/// Opens a throwaway connection and runs `SELECT NOW()`.
pub async fn probe_connection(settings: &ConnectionSettings) -> Result<(), LeadsError> {
    let mut config = settings.to_pg_config();
    config.connect_timeout(PROBE_TIMEOUT);

    let session = tokio::time::timeout(PROBE_TIMEOUT, Session::open(&mut config, settings.ssl))
        .await
        .map_err(|_| LeadsError::Timeout(PROBE_TIMEOUT))??;

    let result = session.client.query_one("SELECT NOW()", &[]).await;
    session.close().await;
    result.map_err(LeadsError::Query)?;

    Ok(())
}

/// A connected client plus the task driving its socket.
struct Session {
    client: Client,
    driver: Option<JoinHandle<Result<(), tokio_postgres::Error>>>,
}

impl Session {
    async fn open(config: &mut tokio_postgres::Config, ssl: bool) -> Result<Self, LeadsError> {
        if ssl {
            config.ssl_mode(SslMode::Require);
            let (client, connection) = config
                .connect(tls_connector()?)
                .await
                .map_err(LeadsError::Connect)?;
            Ok(Self::spawn(client, connection))
        } else {
            config.ssl_mode(SslMode::Disable);
            let (client, connection) = config.connect(NoTls).await.map_err(LeadsError::Connect)?;
            Ok(Self::spawn(client, connection))
        }
    }

    fn spawn<F>(client: Client, connection: F) -> Self
    where
        F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
    {
        Self {
            client,
            driver: Some(tokio::spawn(connection)),
        }
    }

    /// Drops the client so the driver sends Terminate, then waits for the
    /// driver to shut the socket down.
    async fn close(mut self) -> bool {
        let Some(driver) = self.driver.take() else {
            return false;
        };
        drop(self);

        match driver.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "leads database connection error");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "leads database driver task failed");
                false
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

// Hosted Postgres providers hand out certificates we don't pin.
fn tls_connector() -> Result<MakeTlsConnector, LeadsError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(MakeTlsConnector::new(builder.build()))
}

/// Sends a string in text format so the server parses it for whatever type
/// the placeholder resolved to (dates, timestamps, text).
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn row_to_json(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = match column_value(row, idx, column.type_()) {
                Ok(value) => value.unwrap_or(Value::Null),
                Err(e) => {
                    tracing::warn!(
                        column = column.name(),
                        pg_type = %column.type_(),
                        error = %e,
                        "unreadable column, returning null"
                    );
                    Value::Null
                }
            };
            (column.name().to_string(), value)
        })
        .collect()
}

fn column_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Option<Value>, tokio_postgres::Error> {
    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::from(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::from),
        // exact digits, not a lossy float
        "numeric" => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|v| Value::String(v.to_string())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())),
        "time" => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string())),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Value::String(v.to_rfc3339_opts(SecondsFormat::Millis, true))),
        "uuid" => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map(|v| Value::String(v.to_string())),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?,
        // text-like types; interval, inet and arrays fail here and come back null
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::String),
    };
    Ok(value)
}
