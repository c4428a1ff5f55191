//! Staged concurrency schedule
//!
//! A [`Schedule`] maps elapsed run time onto a target number of virtual users. Each [`Stage`]
//! ramps linearly from the previous stage's target (or the start target) to its own target over
//! its duration.
use crate::ConfigError;
use std::fmt;
use std::time::Duration;

/// A time interval with a linear concurrency ramp towards `target`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} VUs",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Whether the schedule is changing concurrency, holding it, or has run out of stages.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Ramping,
    Steady,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    start_target: usize,
    stages: Vec<Stage>,
    total: Duration,
    max_target: usize,
}

impl Schedule {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        Self::with_start_target(0, stages)
    }

    pub fn with_start_target(start_target: usize, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }

        let mut total = Duration::ZERO;
        for (index, stage) in stages.iter().enumerate() {
            total = total.checked_add(stage.duration).ok_or(
                ConfigError::InvalidStageDuration {
                    index,
                    seconds: stage.duration.as_secs_f64(),
                },
            )?;
        }
        let max_target = stages
            .iter()
            .map(|s| s.target)
            .fold(start_target, usize::max);

        Ok(Self {
            start_target,
            stages,
            total,
            max_target,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_target(&self) -> usize {
        self.start_target
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Highest target across all stages, including the start target.
    pub fn max_target(&self) -> usize {
        self.max_target
    }

    /// Target concurrency after `elapsed` run time.
    ///
    /// Piecewise-linear between stage boundaries, rounded to the nearest integer. A zero-duration
    /// stage is never "inside", so its target applies from its start instant onwards. Past the
    /// end of the schedule the final target is returned.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start_target;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return interpolate(from, stage.target, elapsed - stage_start, stage.duration);
            }
            stage_start = stage_end;
            from = stage.target;
        }
        from
    }

    pub fn phase_at(&self, elapsed: Duration) -> Phase {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start_target;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return if from == stage.target {
                    Phase::Steady
                } else {
                    Phase::Ramping
                };
            }
            stage_start = stage_end;
            from = stage.target;
        }
        Phase::Finished
    }
}

fn interpolate(from: usize, to: usize, offset: Duration, duration: Duration) -> usize {
    let progress = offset.as_secs_f64() / duration.as_secs_f64();
    let value = from as f64 + (to as f64 - from as f64) * progress;
    let upper = from.max(to) as f64;
    value.round().clamp(0., upper) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn reference() -> Schedule {
        Schedule::new(vec![
            Stage::new(secs(10), 50),
            Stage::new(secs(30), 50),
            Stage::new(secs(10), 0),
        ])
        .unwrap()
    }

    #[test]
    fn reference_profile() {
        let schedule = reference();
        assert_eq!(schedule.total_duration(), secs(50));
        assert_eq!(schedule.max_target(), 50);

        assert_eq!(schedule.target_at(secs(0)), 0);
        assert_eq!(schedule.target_at(secs(5)), 25);
        assert_eq!(schedule.target_at(secs(10)), 50);
        assert_eq!(schedule.target_at(secs(25)), 50);
        assert_eq!(schedule.target_at(secs(40)), 50);
        assert_eq!(schedule.target_at(secs(45)), 25);
        assert_eq!(schedule.target_at(secs(50)), 0);
        assert_eq!(schedule.target_at(secs(500)), 0);
    }

    #[test]
    fn rounds_to_nearest() {
        let schedule = Schedule::new(vec![Stage::new(secs(4), 1)]).unwrap();
        assert_eq!(schedule.target_at(Duration::from_millis(1_900)), 0);
        assert_eq!(schedule.target_at(Duration::from_millis(2_100)), 1);
    }

    #[test]
    fn continuous_at_boundaries() {
        let schedule = Schedule::with_start_target(
            3,
            vec![
                Stage::new(secs(7), 40),
                Stage::new(secs(3), 12),
                Stage::new(secs(11), 90),
                Stage::new(secs(5), 0),
            ],
        )
        .unwrap();

        assert_eq!(schedule.target_at(Duration::ZERO), 3);

        let step = Duration::from_millis(10);
        let mut t = Duration::ZERO;
        let mut prev = schedule.target_at(t);
        while t <= schedule.total_duration() {
            let cur = schedule.target_at(t);
            // Steepest slope above is 18 VUs/s, i.e. well under one VU per 10ms step.
            assert!(cur.abs_diff(prev) <= 1, "jump at {t:?}: {prev} -> {cur}");
            assert!(cur <= schedule.max_target());
            prev = cur;
            t += step;
        }

        assert_eq!(schedule.target_at(schedule.total_duration()), 0);
    }

    #[test]
    fn zero_duration_stage_jumps() {
        let schedule = Schedule::new(vec![Stage::new(Duration::ZERO, 20)]).unwrap();
        // The whole schedule is the jump itself: already at 20 and finished at t=0.
        assert_eq!(schedule.target_at(Duration::ZERO), 20);
        assert_eq!(schedule.phase_at(Duration::ZERO), Phase::Finished);
        assert_eq!(schedule.total_duration(), Duration::ZERO);

        let schedule = Schedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(Duration::ZERO, 40),
            Stage::new(secs(10), 40),
        ])
        .unwrap();
        assert_eq!(schedule.target_at(Duration::from_millis(9_999)), 10);
        assert_eq!(schedule.target_at(secs(10)), 40);
        assert_eq!(schedule.phase_at(secs(10)), Phase::Steady);
    }

    #[test]
    fn phases() {
        let schedule = reference();
        assert_eq!(schedule.phase_at(secs(1)), Phase::Ramping);
        assert_eq!(schedule.phase_at(secs(20)), Phase::Steady);
        assert_eq!(schedule.phase_at(secs(41)), Phase::Ramping);
        assert_eq!(schedule.phase_at(secs(50)), Phase::Finished);
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(Schedule::new(vec![]).unwrap_err(), ConfigError::EmptyStages);
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let long = Duration::from_secs(u64::MAX / 2 + 1);
        let err = Schedule::new(vec![
            Stage::new(secs(1), 1),
            Stage::new(long, 1),
            Stage::new(long, 1),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidStageDuration { index: 2, .. }
        ));
    }
}
