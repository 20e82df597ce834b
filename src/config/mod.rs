//! Configuration modules.

pub mod logging;
pub mod service;
pub mod settings;

pub use logging::LoggingConfig;
pub use service::{DetectorEntry, ServiceConfig};
pub use settings::{AdminConfig, Config, PollingConfig};
