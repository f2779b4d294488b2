mod config;
mod db;
mod routes;
mod services;
mod state;

use std::process::ExitCode;

use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("server io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to read .env: {err}");
        }
    }
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "studyboard exited");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = config::ServerConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    let state = state::AppState::new(pool, &config.user_id);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

    info!(port = config.port, user_id = %config.user_id, "studyboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}
