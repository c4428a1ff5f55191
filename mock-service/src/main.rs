use axum::http::StatusCode;
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Serves the mock search endpoint on `0.0.0.0:8080`.
///
/// `MOCK_STATUS` and `MOCK_LATENCY_MS` override the response status and delay.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_service=info")),
        )
        .init();

    let mut config = MockConfig::default();
    if let Ok(status) = std::env::var("MOCK_STATUS") {
        config.status = StatusCode::from_u16(status.parse()?)?;
    }
    if let Ok(latency) = std::env::var("MOCK_LATENCY_MS") {
        config.latency = Duration::from_millis(latency.parse()?);
    }

    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    tracing::info!("Mock service listening on {addr} with {config:?}");
    mock_service::run(addr, config).await
}
