//! Named assertions evaluated against every [`RequestResult`].
use crate::executor::RequestResult;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use surge_core::CheckRule;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

type Predicate = dyn Fn(&RequestResult) -> anyhow::Result<bool> + Send + Sync;

/// A named boolean assertion against a response.
///
/// A predicate that returns an error or panics counts as a failed check; it never takes down the
/// virtual user evaluating it.
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Check {
    pub fn new<P>(name: &str, predicate: P) -> Self
    where
        P: Fn(&RequestResult) -> bool + Send + Sync + 'static,
    {
        Self::fallible(name, move |res| Ok(predicate(res)))
    }

    pub fn fallible<P>(name: &str, predicate: P) -> Self
    where
        P: Fn(&RequestResult) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Passes when the response status equals `status`. Network failures never pass.
    pub fn status(name: &str, status: u16) -> Self {
        Self::new(name, move |res| res.status == Some(status))
    }

    /// Passes when the request took strictly less than `max`.
    pub fn faster_than(name: &str, max: Duration) -> Self {
        Self::new(name, move |res| res.duration < max)
    }

    /// Passes when the body is valid UTF-8 and contains `needle`.
    pub fn body_contains(name: &str, needle: &str) -> Self {
        let needle = needle.to_string();
        Self::fallible(name, move |res| {
            let body = std::str::from_utf8(&res.body)?;
            Ok(body.contains(needle.as_str()))
        })
    }

    pub fn from_rule(name: &str, rule: CheckRule) -> Self {
        match rule {
            CheckRule::Status(status) => Self::status(name, status),
            CheckRule::MaxDuration(max) => Self::faster_than(name, max),
            CheckRule::BodyContains(needle) => Self::body_contains(name, &needle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, result: &RequestResult) -> CheckResult {
        let passed = match catch_unwind(AssertUnwindSafe(|| (self.predicate)(result))) {
            Ok(Ok(passed)) => passed,
            Ok(Err(err)) => {
                warn!("Check `{}` errored: {err:#}", self.name);
                false
            }
            Err(_) => {
                warn!("Check `{}` panicked", self.name);
                false
            }
        };

        CheckResult {
            name: self.name.clone(),
            passed,
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Ordered list of checks run against every response.
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(Check::name)
    }

    /// Runs every check, in order, without short-circuiting on failures.
    pub fn evaluate(&self, result: &RequestResult) -> Vec<CheckResult> {
        self.checks.iter().map(|c| c.evaluate(result)).collect()
    }
}

impl FromIterator<Check> for CheckSet {
    fn from_iter<I: IntoIterator<Item = Check>>(iter: I) -> Self {
        Self {
            checks: iter.into_iter().collect(),
        }
    }
}
