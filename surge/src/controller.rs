//! Run controller
//!
//! Drives a run through `Idle -> Ramping <-> Steady -> Stopping -> Done`. Every tick it asks the
//! [`Schedule`] for the target concurrency and reconciles the [`VirtualUserPool`] towards it.
use crate::aggregator::Metrics;
use crate::check::CheckSet;
use crate::error::RunError;
use crate::executor::{HttpExecutor, RequestExecutor};
use crate::pool::VirtualUserPool;
use crate::timer::Timer;
use crate::RunConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use surge_core::{ConfigError, Phase, Report, Schedule};
use tokio::sync::Notify;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Ramping,
    Steady,
    Stopping,
    Done,
}

/// Requests an early, graceful end of a run (e.g. on Ctrl-C).
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    async fn aborted(&self) {
        self.inner.notify.notified().await
    }
}

pub struct RunController<E = HttpExecutor> {
    config: RunConfig,
    schedule: Schedule,
    executor: Arc<E>,
    metrics: Metrics,
    abort: AbortHandle,
    state: RunState,
}

impl RunController<HttpExecutor> {
    /// Validates `config` and builds the HTTP client. Fails without touching the network.
    pub fn new(config: RunConfig) -> Result<Self, RunError> {
        let executor = HttpExecutor::new(&config)?;
        Self::with_executor(config, executor)
    }
}

impl<E: RequestExecutor> RunController<E> {
    pub fn with_executor(config: RunConfig, executor: E) -> Result<Self, RunError> {
        if config.tick.is_zero() {
            return Err(ConfigError::ZeroDuration("tick").into());
        }
        let schedule = Schedule::with_start_target(config.start_target, config.stages.clone())?;
        let metrics = Metrics::with_checks(config.checks.names());

        Ok(Self {
            config,
            schedule,
            executor: Arc::new(executor),
            metrics,
            abort: AbortHandle::default(),
            state: RunState::Idle,
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Live handle on the run's metrics; [`Metrics::snapshot`] may be called while running.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the load test to completion.
    ///
    /// A single preflight request is issued first; if it fails at the network level the run
    /// fails with [`RunError::Unreachable`] before any virtual user starts.
    #[instrument(name = "run", skip_all, fields(name = %self.config.name))]
    pub async fn run(mut self) -> Result<Report, RunError> {
        info!(
            "Running {} against {} ({} stages, {} total, max {} VUs)",
            self.config.name,
            self.config.url,
            self.schedule.stages().len(),
            humantime::format_duration(self.schedule.total_duration()),
            self.schedule.max_target(),
        );

        self.preflight().await?;

        let mut pool = VirtualUserPool::new(
            iteration(
                self.executor.clone(),
                Arc::new(self.config.checks.clone()),
                self.metrics.clone(),
            ),
            self.config.sleep,
            self.metrics.clone(),
        );

        let start = Instant::now();
        let mut timer = Timer::new(self.config.tick).await;
        debug!("Ticking every {timer}");

        // NOTE: Reconcile happens before waiting so that the first tick acts at t=0.
        loop {
            if self.abort.is_aborted() {
                warn!("Run aborted");
                break;
            }

            let elapsed = start.elapsed();
            let target = self.schedule.target_at(elapsed);
            // NOTE: Reconcile even when finished so a trailing zero-duration stage still
            // reaches its target before stopping.
            pool.reconcile(target);

            match self.schedule.phase_at(elapsed) {
                Phase::Finished => break,
                Phase::Ramping => self.transition(RunState::Ramping),
                Phase::Steady => self.transition(RunState::Steady),
            }

            trace!(
                "t={:.2}s target={target} running={} alive={}",
                elapsed.as_secs_f64(),
                pool.running(),
                pool.len()
            );

            tokio::select! {
                _ = timer.tick() => {}
                _ = self.abort.aborted() => {}
            }
        }

        self.transition(RunState::Stopping);
        let interrupted = pool.shutdown(self.config.graceful_stop).await;
        if interrupted > 0 {
            warn!("{interrupted} in-flight requests were interrupted by the graceful stop timeout");
        }
        self.transition(RunState::Done);

        let report = Report {
            name: self.config.name.clone(),
            elapsed: start.elapsed(),
            peak_vus: pool.peak(),
            aborted: self.abort.is_aborted(),
            metrics: self.metrics.snapshot(),
        };
        info!(
            "Run complete: {} requests, {} network errors, p99={:.2}ms",
            report.metrics.requests, report.metrics.network_errors, report.metrics.latency.p99_ms
        );

        Ok(report)
    }

    async fn preflight(&self) -> Result<(), RunError> {
        let probe = self.executor.execute().await;
        match probe.error {
            Some(source) => {
                error!("Preflight request to {} failed: {source}", self.config.url);
                Err(RunError::Unreachable {
                    url: self.config.url.to_string(),
                    source,
                })
            }
            None => {
                debug!(
                    "Preflight ok: status {:?} in {:.2}ms",
                    probe.status,
                    probe.duration_millis()
                );
                Ok(())
            }
        }
    }

    fn transition(&mut self, to: RunState) {
        if self.state != to {
            info!("{:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }
}

/// Body of one virtual user iteration: request, checks, record.
fn iteration<E: RequestExecutor>(
    executor: Arc<E>,
    checks: Arc<CheckSet>,
    metrics: Metrics,
) -> impl Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + Clone + 'static {
    move || {
        let executor = executor.clone();
        let checks = checks.clone();
        let metrics = metrics.clone();
        Box::pin(async move {
            let result = executor.execute().await;
            metrics.record_request(&result);
            for check in checks.evaluate(&result) {
                metrics.record_check(&check);
            }
            metrics.record_iteration();
        })
    }
}
