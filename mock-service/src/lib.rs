//! Stand-in for the search endpoint under test.
use axum::{
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub use axum::http::StatusCode as Status;

/// Behaviour of `GET /search`.
#[derive(Debug, Clone, Copy)]
pub struct MockConfig {
    pub status: StatusCode,
    pub latency: Duration,
    /// Standard deviation of the latency; zero for a fixed delay.
    pub jitter: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            latency: Duration::from_millis(50),
            jitter: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct AppState {
    config: MockConfig,
    hits: Arc<AtomicU64>,
}

/// A running mock service.
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub addr: SocketAddr,
    hits: Arc<AtomicU64>,
}

impl MockHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests served so far, across all routes.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

pub fn router(config: MockConfig) -> (Router, Arc<AtomicU64>) {
    let hits = Arc::new(AtomicU64::new(0));
    let state = AppState {
        config,
        hits: hits.clone(),
    };

    let app = Router::new()
        .route("/search", get(search))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    (app, hits)
}

/// Serves on `addr` until the process exits.
pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let (app, hits) = router(config);
    tokio::spawn(hits_measure_task(hits));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Serves on an ephemeral localhost port in a background task.
pub async fn spawn(config: MockConfig) -> anyhow::Result<MockHandle> {
    let (app, hits) = router(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    Ok(MockHandle { addr, hits })
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    query: String,
    hits: Vec<String>,
}

#[debug_handler]
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    state.hits.fetch_add(1, Ordering::Relaxed);
    let delay = sample_latency(&state.config);
    tokio::time::sleep(delay).await;

    let query = params.q.unwrap_or_default();
    debug!("search q={query} delay={delay:?}");
    (
        state.config.status,
        Json(SearchResponse {
            query,
            hits: vec![],
        }),
    )
}

fn sample_latency(config: &MockConfig) -> Duration {
    if config.jitter.is_zero() {
        return config.latency;
    }

    match Normal::new(config.latency.as_secs_f64(), config.jitter.as_secs_f64()) {
        Ok(normal) => {
            let secs: f64 = normal.sample(&mut rand::thread_rng());
            Duration::from_secs_f64(secs.max(0.))
        }
        Err(_) => config.latency,
    }
}

/** Hits Printer **/

async fn hits_measure_task(hits: Arc<AtomicU64>) {
    let mut last = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let total = hits.load(Ordering::Relaxed);
        println!("{} req/s", total - last);
        last = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_latency_without_jitter() {
        let config = MockConfig::default();
        assert_eq!(sample_latency(&config), Duration::from_millis(50));
    }

    #[test]
    fn jittered_latency_never_panics() {
        let config = MockConfig {
            latency: Duration::from_millis(1),
            jitter: Duration::from_millis(10),
            ..Default::default()
        };
        for _ in 0..1_000 {
            assert!(sample_latency(&config) < Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn counts_search_hits() {
        let mock = spawn(MockConfig {
            latency: Duration::ZERO,
            ..Default::default()
        })
        .await
        .unwrap();

        let body = reqwest::get(mock.url("/search?q=tech"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, r#"{"query":"tech","hits":[]}"#);
        assert_eq!(mock.hits(), 1);
    }
}
