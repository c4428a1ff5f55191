use crate::error::duration_from_secs;
use crate::{
    ConfigError, Schedule, Stage, DEFAULT_GRACEFUL_STOP, DEFAULT_SLEEP, DEFAULT_TICK,
    DEFAULT_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// File-level description of a run.
///
/// This is the serializable configuration surface. Numbers are kept as written so that invalid
/// values (negative durations or targets) are reported as [`ConfigError`]s rather than as parse
/// failures.
///
/// ```json
/// {
///   "targetUrl": "http://localhost:8080/search",
///   "query": { "q": "tech" },
///   "stages": [
///     { "durationSeconds": 10, "target": 50 },
///     { "durationSeconds": 30, "target": 50 },
///     { "durationSeconds": 10, "target": 0 }
///   ],
///   "checks": [
///     { "name": "is status 200", "status": 200 },
///     { "name": "is fast", "maxDurationMs": 200 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(alias = "targetURL")]
    pub target_url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub start_target: i64,
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_graceful_stop_seconds")]
    pub graceful_stop_seconds: f64,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    pub duration_seconds: f64,
    pub target: i64,
}

/// Query parameters appended to every request, either raw (`q=tech`) or as a map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Query {
    Raw(String),
    Params(BTreeMap<String, String>),
}

/// A declarative check. Exactly one rule field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckRule {
    Status(u16),
    MaxDuration(Duration),
    BodyContains(String),
}

impl CheckSpec {
    pub fn rule(&self) -> Result<CheckRule, ConfigError> {
        let invalid = |reason| ConfigError::InvalidCheck {
            name: self.name.clone(),
            reason,
        };

        match (&self.status, &self.max_duration_ms, &self.body_contains) {
            (Some(status), None, None) => Ok(CheckRule::Status(*status)),
            (None, Some(ms), None) => {
                let secs = ms / 1000.;
                Duration::try_from_secs_f64(secs)
                    .map(CheckRule::MaxDuration)
                    .map_err(|_| invalid("`maxDurationMs` must be a non-negative number"))
            }
            (None, None, Some(needle)) => Ok(CheckRule::BodyContains(needle.clone())),
            (None, None, None) => Err(invalid("no rule given")),
            _ => Err(invalid("more than one rule given")),
        }
    }
}

impl RunSpec {
    /// The reference profile: ramp to 50 VUs over 10s, hold for 30s, ramp down over 10s.
    pub fn reference() -> Self {
        Self {
            name: default_name(),
            target_url: "http://localhost:8080/search".to_string(),
            method: default_method(),
            query: Some(Query::Raw("q=tech".to_string())),
            headers: BTreeMap::new(),
            stages: vec![
                StageSpec {
                    duration_seconds: 10.,
                    target: 50,
                },
                StageSpec {
                    duration_seconds: 30.,
                    target: 50,
                },
                StageSpec {
                    duration_seconds: 10.,
                    target: 0,
                },
            ],
            start_target: 0,
            sleep_seconds: default_sleep_seconds(),
            timeout_seconds: default_timeout_seconds(),
            tick_millis: default_tick_millis(),
            graceful_stop_seconds: default_graceful_stop_seconds(),
            checks: vec![
                CheckSpec {
                    name: "is status 200".to_string(),
                    status: Some(200),
                    ..Default::default()
                },
                CheckSpec {
                    name: "is fast".to_string(),
                    max_duration_ms: Some(200.),
                    ..Default::default()
                },
            ],
        }
    }

    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        let start_target = usize::try_from(self.start_target)
            .map_err(|_| ConfigError::NegativeStartTarget(self.start_target))?;

        let stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| stage.to_stage(index))
            .collect::<Result<Vec<_>, _>>()?;

        Schedule::with_start_target(start_target, stages)
    }

    /// Target url with the configured query appended.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.target_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.target_url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.target_url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        if let Some(query) = &self.query {
            append_query(&mut url, query);
        }

        Ok(url)
    }

    pub fn sleep(&self) -> Result<Duration, ConfigError> {
        duration_from_secs("sleepSeconds", self.sleep_seconds)
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration_from_secs("timeoutSeconds", self.timeout_seconds)
    }

    pub fn graceful_stop(&self) -> Result<Duration, ConfigError> {
        duration_from_secs("gracefulStopSeconds", self.graceful_stop_seconds)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

impl StageSpec {
    fn to_stage(&self, index: usize) -> Result<Stage, ConfigError> {
        let duration = Duration::try_from_secs_f64(self.duration_seconds).map_err(|_| {
            ConfigError::InvalidStageDuration {
                index,
                seconds: self.duration_seconds,
            }
        })?;
        let target = usize::try_from(self.target).map_err(|_| ConfigError::NegativeTarget {
            index,
            target: self.target,
        })?;
        Ok(Stage::new(duration, target))
    }
}

/// Appends `query` to whatever query `url` already carries.
pub fn append_query(url: &mut Url, query: &Query) {
    match query {
        Query::Raw(raw) => {
            let raw = raw.trim_start_matches('?');
            if raw.is_empty() {
                return;
            }
            let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect();
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Query::Params(params) => {
            if params.is_empty() {
                return;
            }
            url.query_pairs_mut().extend_pairs(params);
        }
    }
}

fn default_name() -> String {
    "default".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_sleep_seconds() -> f64 {
    DEFAULT_SLEEP.as_secs_f64()
}

fn default_timeout_seconds() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

fn default_tick_millis() -> u64 {
    DEFAULT_TICK.as_millis() as u64
}

fn default_graceful_stop_seconds() -> f64 {
    DEFAULT_GRACEFUL_STOP.as_secs_f64()
}
