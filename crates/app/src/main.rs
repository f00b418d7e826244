mod command;
mod dto;
mod problem;
mod projection;
mod query;
mod router;
mod telemetry;

#[cfg(test)]
mod acceptance;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use tracing::info;

use customer_crud_storage::Database;
use customer_crud_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;
    if let Some(path) = env_file {
        info!(stage = "app", path = %path.display(), "loaded environment file");
    }

    let write_db = Database::connect(&config.write_db_url).await?;
    write_db.run_migrations().await?;
    let read_db = if config.has_separate_read_store() {
        let read_db = Database::connect(&config.read_db_url).await?;
        read_db.run_migrations().await?;
        read_db
    } else {
        write_db.clone()
    };
    info!(
        stage = "storage",
        separate_read_store = config.has_separate_read_store(),
        "databases ready"
    );

    let state = router::AppState::new(metrics, write_db, read_db, config.projection_interval);
    state.projection().clone().spawn();

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
