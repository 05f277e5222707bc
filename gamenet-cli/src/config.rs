//! Configuration file support for GameNet CLI tools

use gamenet_protocol::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Slowest accepted send rate, in packets per second
pub const MIN_RATE: f64 = 1e-3;

/// Longest accepted settle or linger wait, in seconds
pub const MAX_WAIT_SECS: f64 = 86_400.0;

/// Retransmission and reordering timings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Delay between two transmissions of one reliable frame
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Give-up time for unacknowledged frames and unresolved gaps
    #[serde(default = "default_lifetime_ms")]
    pub lifetime_ms: u64,
}

fn default_retry_interval_ms() -> u64 {
    50
}

fn default_lifetime_ms() -> u64 {
    200
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            retry_interval_ms: default_retry_interval_ms(),
            lifetime_ms: default_lifetime_ms(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid("retry_interval_ms must be positive".into()));
        }
        if self.lifetime_ms < self.retry_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "lifetime_ms ({}) must be at least retry_interval_ms ({})",
                self.lifetime_ms, self.retry_interval_ms
            )));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_retry_interval(Duration::from_millis(self.retry_interval_ms))
            .with_lifetime_threshold(Duration::from_millis(self.lifetime_ms))
    }
}

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Receiver host name or address
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of application packets to send
    #[serde(default = "default_count")]
    pub count: u32,
    /// Packets per second; 0 sends as fast as the loop allows
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Seed for channel and payload selection
    #[serde(default)]
    pub seed: u64,
    /// Share of packets sent on the reliable channel (0.0 to 1.0)
    #[serde(default = "default_reliable_ratio")]
    pub reliable_ratio: f64,
    /// Time allowed for retransmissions before the summary is sent
    #[serde(default = "default_settle_secs")]
    pub settle_secs: f64,
    /// Time to keep serving ACKs after the summary
    #[serde(default = "default_linger_secs")]
    pub linger_secs: f64,
    /// Statistics interval in seconds (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub engine: EngineSettings,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4433
}

fn default_count() -> u32 {
    200
}

fn default_rate() -> f64 {
    50.0
}

fn default_reliable_ratio() -> f64 {
    0.5
}

fn default_settle_secs() -> f64 {
    1.0
}

fn default_linger_secs() -> f64 {
    2.0
}

fn default_stats_interval() -> u64 {
    1
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            host: default_host(),
            port: default_port(),
            count: default_count(),
            rate: default_rate(),
            seed: 0,
            reliable_ratio: default_reliable_ratio(),
            settle_secs: default_settle_secs(),
            linger_secs: default_linger_secs(),
            stats_interval_secs: default_stats_interval(),
            engine: EngineSettings::default(),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.reliable_ratio) {
            return Err(ConfigError::Invalid(format!(
                "reliable_ratio must be within [0, 1], got {}",
                self.reliable_ratio
            )));
        }
        // 0 means unpaced; anything else must give a representable interval
        if !self.rate.is_finite() || self.rate < 0.0 || (self.rate > 0.0 && self.rate < MIN_RATE) {
            return Err(ConfigError::Invalid(format!(
                "rate must be 0 or at least {}, got {}",
                MIN_RATE, self.rate
            )));
        }
        for (name, value) in [("settle_secs", self.settle_secs), ("linger_secs", self.linger_secs)] {
            if !(0.0..=MAX_WAIT_SECS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, {}], got {}",
                    name, MAX_WAIT_SECS, value
                )));
            }
        }
        self.engine.validate()
    }

    /// Resolve the receiver address
    pub fn peer_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.host, self.port)
    }

    /// Gap between two sends
    pub fn send_interval(&self) -> Duration {
        if self.rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.rate)
        } else {
            Duration::from_millis(10)
        }
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_secs_f64(self.settle_secs)
    }

    pub fn linger_time(&self) -> Duration {
        Duration::from_secs_f64(self.linger_secs)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Exit once the sender's summary has been reported
    #[serde(default)]
    pub exit_after_report: bool,
    /// Statistics interval in seconds (0 disables)
    #[serde(default = "default_receiver_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub engine: EngineSettings,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_receiver_stats_interval() -> u64 {
    5
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            bind: default_bind(),
            port: default_port(),
            exit_after_report: false,
            stats_interval_secs: default_receiver_stats_interval(),
            engine: EngineSettings::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.bind, self.port)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ConfigError::Invalid(format!("{}:{} did not resolve to any address", host, port)))
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sender configuration
    pub sender: Option<SenderConfig>,
    /// Receiver configuration
    pub receiver: Option<ReceiverConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            sender: Some(SenderConfig::default()),
            receiver: None,
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            sender: None,
            receiver: Some(ReceiverConfig {
                exit_after_report: true,
                ..ReceiverConfig::default()
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
