use std::sync::Arc;

use mock_server::{MockConfig, MockState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_server=info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let defaults = MockConfig::default();
    let config = MockConfig {
        username: std::env::var("AKHET_USERNAME").unwrap_or(defaults.username),
        password: std::env::var("AKHET_PASSWORD").unwrap_or(defaults.password),
        version: defaults.version,
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, user = %config.username, "listening");
    mock_server::run_with_state(listener, Arc::new(MockState::new(config))).await
}
