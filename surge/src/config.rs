use crate::check::{Check, CheckSet};
use reqwest::Method;
use std::time::Duration;
use surge_core::{
    append_query, ConfigError, Query, RunSpec, Stage, Url, DEFAULT_GRACEFUL_STOP, DEFAULT_SLEEP,
    DEFAULT_TICK, DEFAULT_TIMEOUT,
};

/// Everything a run needs, passed explicitly to [`crate::RunController`].
///
/// Build one programmatically with the chained setters, or convert a [`RunSpec`] loaded from a
/// file with `RunConfig::try_from(spec)`.
///
/// # Example
/// ```no_run
/// use surge::prelude::*;
/// use std::time::Duration;
///
/// # fn build() -> Result<RunConfig, surge::ConfigError> {
/// let url = Url::parse("http://localhost:8080/search").unwrap();
/// let config = RunConfig::new(url)
///     .query(&Query::Raw("q=tech".to_string()))
///     .stage(Duration::from_secs(10), 50)
///     .stage(Duration::from_secs(30), 50)
///     .stage(Duration::from_secs(10), 0)
///     .check(Check::status("is status 200", 200))
///     .check(Check::faster_than("is fast", Duration::from_millis(200)))
///     .sleep(Duration::from_secs(1));
/// # Ok(config)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub name: String,
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub start_target: usize,
    pub stages: Vec<Stage>,
    pub checks: CheckSet,
    pub sleep: Duration,
    pub timeout: Duration,
    pub tick: Duration,
    pub graceful_stop: Duration,
}

impl RunConfig {
    pub fn new(url: Url) -> Self {
        Self {
            name: "default".to_string(),
            method: Method::GET,
            url,
            headers: vec![],
            start_target: 0,
            stages: vec![],
            checks: CheckSet::new(),
            sleep: DEFAULT_SLEEP,
            timeout: DEFAULT_TIMEOUT,
            tick: DEFAULT_TICK,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    /// The reference profile, see [`RunSpec::reference`].
    pub fn reference() -> Result<Self, ConfigError> {
        RunSpec::reference().try_into()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn query(mut self, query: &Query) -> Self {
        append_query(&mut self.url, query);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn start_target(mut self, start_target: usize) -> Self {
        self.start_target = start_target;
        self
    }

    pub fn stage(mut self, duration: Duration, target: usize) -> Self {
        self.stages.push(Stage::new(duration, target));
        self
    }

    pub fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = stages;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Fixed delay between two iterations of a virtual user.
    pub fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Per-request timeout. Timed out requests are network failures.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How often the controller re-evaluates the schedule.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }
}

impl TryFrom<RunSpec> for RunConfig {
    type Error = ConfigError;

    fn try_from(spec: RunSpec) -> Result<Self, Self::Error> {
        let schedule = spec.schedule()?;
        let method = Method::from_bytes(spec.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(spec.method.clone()))?;

        let checks = spec
            .checks
            .iter()
            .map(|c| Ok(Check::from_rule(&c.name, c.rule()?)))
            .collect::<Result<CheckSet, ConfigError>>()?;

        Ok(Self {
            name: spec.name.clone(),
            method,
            url: spec.url()?,
            headers: spec.headers.clone().into_iter().collect(),
            start_target: schedule.start_target(),
            stages: schedule.stages().to_vec(),
            checks,
            sleep: spec.sleep()?,
            timeout: spec.timeout()?,
            tick: spec.tick(),
            graceful_stop: spec.graceful_stop()?,
        })
    }
}
