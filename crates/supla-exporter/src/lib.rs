//! supla-exporter: Prometheus exporter for SUPLA devices that only expose an HTML status page.

pub mod config;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod server;

pub use config::{resolve_config_path, Config, GlobalConfig};
pub use error::{ConfigError, ExporterError, ExporterResult};
pub use metrics::PrometheusSink;
pub use scheduler::{build_runner, Scheduler};
pub use server::ServerState;
