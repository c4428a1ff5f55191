use crate::REPORT_QUANTILES;
use serde::Serialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::fmt;
use std::time::Duration;

/// Pass/fail totals for a single named check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTally {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
    /// Share of passing evaluations in `[0, 1]`, `None` if the check never ran.
    pub pass_rate: Option<f64>,
}

impl CheckTally {
    pub fn new(name: impl Into<String>, passed: u64, failed: u64) -> Self {
        let total = passed + failed;
        let pass_rate = (total > 0).then(|| passed as f64 / total as f64);
        Self {
            name: name.into(),
            passed,
            failed,
            pass_rate,
        }
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }
}

/// Request duration distribution, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Exact nearest-rank percentiles over every sample.
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.retain(|s| s.is_finite());
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);

        let count = samples.len();
        let mean_ms = samples.iter().sum::<f64>() / count as f64;
        let [p50_ms, p90_ms, p95_ms, p99_ms] = REPORT_QUANTILES.map(|q| quantile(&samples, q));

        Self {
            count: count as u64,
            min_ms: samples[0],
            mean_ms,
            max_ms: samples[count - 1],
            p50_ms,
            p90_ms,
            p95_ms,
            p99_ms,
        }
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Point-in-time view of the aggregated metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub requests: u64,
    pub network_errors: u64,
    /// In-flight requests cut off when the graceful stop window ran out.
    pub interrupted: u64,
    pub checks: Vec<CheckTally>,
    pub latency: LatencySummary,
}

impl MetricsSnapshot {
    pub fn check(&self, name: &str) -> Option<&CheckTally> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Final report of a run
#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub name: String,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    pub peak_vus: usize,
    pub aborted: bool,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

impl Report {
    pub fn check(&self, name: &str) -> Option<&CheckTally> {
        self.metrics.check(name)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        writeln!(
            f,
            "run `{}` {} after {} (peak {} VUs)",
            self.name,
            if self.aborted { "aborted" } else { "finished" },
            humantime::format_duration(elapsed),
            self.peak_vus,
        )?;

        let m = &self.metrics;
        if !m.checks.is_empty() {
            writeln!(f)?;
            writeln!(f, "  checks")?;
            for check in &m.checks {
                let mark = if check.failed == 0 { "ok  " } else { "FAIL" };
                let rate = match check.pass_rate {
                    Some(rate) => format!("{:.2}%", rate * 100.),
                    None => "n/a".to_string(),
                };
                writeln!(
                    f,
                    "    {mark} {:<24} {rate:>8} ({} passed, {} failed)",
                    check.name, check.passed, check.failed
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "  iterations        {}", m.iterations)?;
        writeln!(
            f,
            "  requests          {} ({} network errors, {} interrupted)",
            m.requests, m.network_errors, m.interrupted
        )?;
        let l = &m.latency;
        write!(
            f,
            "  request duration  min={:.2}ms mean={:.2}ms p50={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
            l.min_ms, l.mean_ms, l.p50_ms, l.p90_ms, l.p95_ms, l.p99_ms, l.max_ms
        )
    }
}
