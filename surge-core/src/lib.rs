mod config;
mod constants;
mod error;
mod schedule;
mod stats;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use schedule::*;
pub use stats::*;

pub use url::Url;
