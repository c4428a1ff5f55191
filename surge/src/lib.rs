#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod aggregator;
pub mod check;
mod config;
pub mod controller;
mod error;
pub mod executor;
pub mod pool;
mod timer;

pub use aggregator::Metrics;
pub use check::{Check, CheckResult, CheckSet};
pub use config::RunConfig;
pub use controller::{AbortHandle, RunController, RunState};
pub use error::{RequestError, RunError};
pub use executor::{FnExecutor, HttpExecutor, RequestExecutor, RequestResult};
pub use pool::{VirtualUserPool, VirtualUserState};

pub use surge_core;
pub use surge_core::{ConfigError, Report, RunSpec};

pub mod prelude {
    pub use crate::check::Check;
    pub use crate::config::RunConfig;
    pub use crate::controller::RunController;

    pub use surge_core::{Query, Report, RunSpec, Stage, Url};
}
