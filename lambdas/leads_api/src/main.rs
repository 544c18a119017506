use lambda_http::{run, tracing, Error};

use leads_core::config::error_policy_from_env;
use leads_core::{build_router, store_from_env, AppState};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing::init_default_subscriber();

    let error_policy = error_policy_from_env()?;
    let state = AppState::new(store_from_env(), error_policy);

    run(build_router(state)).await
}
