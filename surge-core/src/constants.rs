use std::time::Duration;

/// Delay between two iterations of the same virtual user.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(1);

/// Per-request timeout. A request exceeding it is a network failure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the run controller re-evaluates the schedule.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// How long in-flight iterations may run once a run starts stopping.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Percentiles reported for request durations.
pub const REPORT_QUANTILES: [f64; 4] = [0.50, 0.90, 0.95, 0.99];
