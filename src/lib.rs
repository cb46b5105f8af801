#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;

pub use config::{MonitorSettings, Settings};
pub use error::{Error, Result};
pub use metrics::Metrics;
