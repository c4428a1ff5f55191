use thiserror::Error;

/// Invalid run configuration. Always fatal, and always raised before any
/// virtual user is started.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("stage list is empty")]
    EmptyStages,

    #[error("stage {index} has an invalid duration of {seconds}s")]
    InvalidStageDuration { index: usize, seconds: f64 },

    #[error("stage {index} has a negative target of {target}")]
    NegativeTarget { index: usize, target: i64 },

    #[error("start target must not be negative (got {0})")]
    NegativeStartTarget(i64),

    #[error("invalid target url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("unsupported http method `{0}`")]
    InvalidMethod(String),

    #[error("`{field}` must be a finite, non-negative number (got {value})")]
    InvalidSeconds { field: &'static str, value: f64 },

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("check `{name}` is invalid: {reason}")]
    InvalidCheck { name: String, reason: &'static str },
}

/// Converts a user supplied number of seconds into a [`std::time::Duration`].
pub(crate) fn duration_from_secs(
    field: &'static str,
    value: f64,
) -> Result<std::time::Duration, ConfigError> {
    std::time::Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::InvalidSeconds { field, value })
}
