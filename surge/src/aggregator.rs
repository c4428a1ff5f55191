//! Shared run metrics
//!
//! [`Metrics`] is the only state shared between virtual users. Every update is a single atomic
//! operation (or a lock-free bucket push for durations), so concurrent writers never lose
//! updates. With the `metrics` feature enabled each update is mirrored to the [`metrics`] facade.
use crate::check::CheckResult;
use crate::executor::RequestResult;
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use surge_core::{CheckTally, LatencySummary, MetricsSnapshot};

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    iterations: AtomicU64,
    requests: AtomicU64,
    network_errors: AtomicU64,
    interrupted: AtomicU64,
    // NOTE: Only grows. Counters are looked up under the read lock and incremented atomically.
    checks: RwLock<Vec<Arc<CheckCounter>>>,
    durations_ms: AtomicBucket<f64>,
}

struct CheckCounter {
    name: Arc<str>,
    passed: AtomicU64,
    failed: AtomicU64,
}

impl CheckCounter {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            passed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                iterations: AtomicU64::new(0),
                requests: AtomicU64::new(0),
                network_errors: AtomicU64::new(0),
                interrupted: AtomicU64::new(0),
                checks: RwLock::new(Vec::new()),
                durations_ms: AtomicBucket::new(),
            }),
        }
    }

    /// Pre-registers checks so they appear in reports (in this order) even if never evaluated.
    pub fn with_checks<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let metrics = Self::new();
        for name in names {
            metrics.counter(name);
        }
        metrics
    }

    pub fn record_check(&self, result: &CheckResult) {
        let counter = self.counter(&result.name);
        if result.passed {
            counter.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            counter.failed.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "surge_checks",
            "check" => result.name.to_string(),
            "result" => if result.passed { "pass" } else { "fail" }
        )
        .increment(1);
    }

    pub fn record_duration(&self, duration_ms: f64) {
        self.inner.durations_ms.push(duration_ms);

        #[cfg(feature = "metrics")]
        metrics::histogram!("surge_request_duration").record(duration_ms);
    }

    /// Counts a request. Only requests that got a response contribute a duration sample.
    pub fn record_request(&self, result: &RequestResult) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("surge_requests").increment(1);

        if result.is_network_error() {
            self.inner.network_errors.fetch_add(1, Ordering::Relaxed);

            #[cfg(feature = "metrics")]
            metrics::counter!("surge_network_errors").increment(1);
        } else {
            self.record_duration(result.duration_millis());
        }
    }

    pub fn record_iteration(&self) {
        self.inner.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupted(&self) {
        self.inner.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(unused_variables)]
    pub(crate) fn set_active_vus(&self, count: usize) {
        #[cfg(feature = "metrics")]
        metrics::gauge!("surge_vus").set(count as f64);
    }

    /// Point-in-time view. Each counter is read atomically; counters are not read as a group, so
    /// writes racing the snapshot may show up in one counter and not yet in another.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let checks = self
            .inner
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| {
                CheckTally::new(
                    &*c.name,
                    c.passed.load(Ordering::Relaxed),
                    c.failed.load(Ordering::Relaxed),
                )
            })
            .collect();

        MetricsSnapshot {
            iterations: self.inner.iterations.load(Ordering::Relaxed),
            requests: self.inner.requests.load(Ordering::Relaxed),
            network_errors: self.inner.network_errors.load(Ordering::Relaxed),
            interrupted: self.inner.interrupted.load(Ordering::Relaxed),
            checks,
            latency: LatencySummary::from_samples(self.inner.durations_ms.data()),
        }
    }

    fn counter(&self, name: &str) -> Arc<CheckCounter> {
        {
            let checks = self
                .inner
                .checks
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = checks.iter().find(|c| &*c.name == name) {
                return counter.clone();
            }
        }

        let mut checks = self
            .inner
            .checks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another writer may have registered it between the two locks.
        if let Some(counter) = checks.iter().find(|c| &*c.name == name) {
            return counter.clone();
        }
        let counter = Arc::new(CheckCounter::new(name.into()));
        checks.push(counter.clone());
        counter
    }
}
