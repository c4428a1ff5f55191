//! Request execution
//!
//! A [`RequestExecutor`] issues the configured request once and measures it. [`HttpExecutor`] is
//! the real implementation; [`FnExecutor`] wraps a closure and is mostly useful for driving the
//! engine without a network.
use crate::error::{RequestError, RunError};
use crate::RunConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::borrow::Cow;
use std::future::Future;
use std::time::{Duration, Instant};
use surge_core::{ConfigError, Url};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Outcome of a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    /// `None` when the request failed before a response arrived.
    pub status: Option<u16>,
    /// Wall-clock time from send until the full body was received (or the failure).
    pub duration: Duration,
    pub body: Vec<u8>,
    pub error: Option<RequestError>,
}

impl RequestResult {
    pub fn response(status: u16, duration: Duration, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            duration,
            body: body.into(),
            error: None,
        }
    }

    pub fn failure(error: RequestError, duration: Duration) -> Self {
        Self {
            status: None,
            duration,
            body: Vec::new(),
            error: Some(error),
        }
    }

    pub fn duration_millis(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.
    }

    pub fn is_network_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub trait RequestExecutor: Send + Sync + 'static {
    fn execute(&self) -> impl Future<Output = RequestResult> + Send;
}

/// Issues the configured request with a shared, pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl HttpExecutor {
    pub fn new(config: &RunConfig) -> Result<Self, RunError> {
        let headers = header_map(&config.headers)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RunError::Client)?;

        Ok(Self {
            client,
            method: config.method.clone(),
            url: config.url.clone(),
            headers,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl RequestExecutor for HttpExecutor {
    async fn execute(&self) -> RequestResult {
        let start = Instant::now();
        let res = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .send()
            .await;

        let response = match res {
            Ok(response) => response,
            Err(err) => {
                trace!("Request failed: {err}");
                return RequestResult::failure(err.into(), start.elapsed());
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => RequestResult::response(status, start.elapsed(), body.to_vec()),
            Err(err) => {
                trace!("Reading body failed: {err}");
                RequestResult::failure(err.into(), start.elapsed())
            }
        }
    }
}

/// Adapts a closure into a [`RequestExecutor`].
#[derive(Clone)]
pub struct FnExecutor<F>(pub F);

impl<F, Fut> RequestExecutor for FnExecutor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestResult> + Send,
{
    fn execute(&self) -> impl Future<Output = RequestResult> + Send {
        (self.0)()
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ConfigError> {
    let invalid = |name: &str, reason: String| ConfigError::InvalidHeader {
        name: name.to_string(),
        reason,
    };

    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(name, e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(name, e.to_string()))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}
