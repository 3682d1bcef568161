mod config;
mod error;
mod routes;
mod services;
mod state;

use crate::error::ErrorCode;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let config = match config::RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "relay configuration invalid");
            return Err(e.into());
        }
    };
    let addr = config.socket_addr();

    let state = state::AppState::new(config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
