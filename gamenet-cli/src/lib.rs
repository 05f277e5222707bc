//! GameNet CLI Library
//!
//! Shared functionality for the GameNet sender and receiver tools.

pub mod config;
pub mod payload;
pub mod stats;

pub use config::{Config, ConfigError, EngineSettings, ReceiverConfig, SenderConfig};
pub use payload::{PayloadGenerator, Sample, SampleKind};
pub use stats::{
    display_compact_stats, display_engine_stats, display_report_table, format_bandwidth,
    format_bytes, format_ratio, format_rtt,
};

use tracing_subscriber::EnvFilter;

/// Install the log subscriber; `RUST_LOG` overrides the default level
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
