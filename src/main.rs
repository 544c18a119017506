use dotenvy::dotenv;
use tokio::net::TcpListener;

use leads_core::{build_router, store_from_env, AppState, ServerConfig};

mod logging;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv().ok();
    logging::init_logging();

    let config = ServerConfig::from_env().map_err(Error::Config)?;
    let state = AppState::new(store_from_env(), config.error_policy);
    let router = build_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        error_policy = ?config.error_policy,
        "leads dashboard listening"
    );
    axum::serve(listener, router).await?;

    Ok(())
}
