//! Environment-driven configuration.
//!
//! Both binaries load `.env` with dotenvy first; everything here reads from a
//! lookup function so tests never touch the process environment.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::LeadsError;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "postgres";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// How report routes answer when the store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// 200 with the report's empty body, so dashboard code can always iterate.
    #[default]
    Fallback,
    /// 500 with `{"error": ...}`.
    Surface,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(ErrorPolicy::Fallback),
            "surface" => Ok(ErrorPolicy::Surface),
            other => Err(format!("unknown error policy '{other}'")),
        }
    }
}

/// Where to find the leads database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbConfig {
    Url { url: String },
    Params(ConnectionSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl: bool,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, LeadsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LeadsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("DATABASE_URL")
            .filter(|u| u.starts_with("postgresql://") || u.starts_with("postgres://"))
        {
            tracing::info!("using DATABASE_URL for the leads database");
            return Ok(DbConfig::Url { url });
        }

        match (get("DB_HOST"), get("DB_USER"), get("DB_PASSWORD")) {
            (Some(host), Some(user), Some(password)) => {
                let settings = ConnectionSettings {
                    port: get("DB_PORT")
                        .and_then(|p| p.parse().ok())
                        .filter(|p| *p != 0)
                        .unwrap_or(DEFAULT_PORT),
                    database: get("DB_NAME").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
                    ssl: get("DB_SSL").as_deref() == Some("true"),
                    host,
                    user,
                    password,
                };
                tracing::info!(
                    host = %settings.host,
                    port = settings.port,
                    database = %settings.database,
                    "using individual DB_* variables for the leads database"
                );
                Ok(DbConfig::Params(settings))
            }
            _ => Err(LeadsError::Config(
                "set DATABASE_URL or DB_HOST, DB_USER, DB_PASSWORD".to_string(),
            )),
        }
    }

    /// URL connections always negotiate TLS.
    pub fn ssl(&self) -> bool {
        match self {
            DbConfig::Url { .. } => true,
            DbConfig::Params(settings) => settings.ssl,
        }
    }

    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config, LeadsError> {
        match self {
            DbConfig::Url { url } => {
                tokio_postgres::Config::from_str(url).map_err(LeadsError::Connect)
            }
            DbConfig::Params(settings) => Ok(settings.to_pg_config()),
        }
    }
}

impl ConnectionSettings {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

/// Settings for the long-running HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub error_policy: ErrorPolicy,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e| format!("invalid BIND_ADDR: {e}"))?;

        Ok(Self {
            bind_addr,
            error_policy: error_policy_from_lookup(lookup)?,
        })
    }
}

pub fn error_policy_from_env() -> Result<ErrorPolicy, String> {
    error_policy_from_lookup(|key| std::env::var(key).ok())
}

fn error_policy_from_lookup<F>(lookup: F) -> Result<ErrorPolicy, String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LEADS_ERROR_POLICY")
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<ErrorPolicy>())
        .transpose()
        .map(Option::unwrap_or_default)
}
