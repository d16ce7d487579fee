//! Layered configuration: compiled defaults -> TOML file -> environment
//! overrides, the way the teacher's config crate resolves its own
//! settings (see SPEC_FULL.md §11).

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqttTransport {
    Tcp,
    Websockets,
}

impl Default for MqttTransport {
    fn default() -> Self {
        MqttTransport::Tcp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub transport: MqttTransport,
    pub ws_path: String,
    pub prefix: String,
    pub manufacturer: String,
    pub interface_version: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            transport: MqttTransport::Tcp,
            ws_path: "/mqtt".into(),
            prefix: "uagv".into(),
            manufacturer: "acme".into(),
            interface_version: "v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub heartbeat_timeout_default_s: u64,
    pub cancel_timeout_s: u64,
    pub resume_timeout_s: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_default_s: 30,
            cancel_timeout_s: 15,
            resume_timeout_s: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub backpressure_queue_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { backpressure_queue_size: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub log_filter: String,
    pub health_bind_addr: String,
    pub status_flush_interval_ms: u64,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            health_bind_addr: "127.0.0.1:9090".into(),
            status_flush_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub database_url: String,
    pub timeouts: TimeoutsConfig,
    pub transport: TransportConfig,
    pub ambient: AmbientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            database_url: "http://localhost:8080".into(),
            timeouts: TimeoutsConfig::default(),
            transport: TransportConfig::default(),
            ambient: AmbientConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from compiled defaults, an optional TOML file
    /// (explicit `cli_path`, else the first of the standard locations that
    /// exists), then environment variable overrides. Returns the sources
    /// consulted so the caller can log/print them (mirrors the teacher's
    /// `load_with_sources_from`).
    pub fn load(cli_path: Option<&Path>) -> Result<(Config, ConfigSources), ConfigError> {
        loader::load(cli_path)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.timeouts.heartbeat_timeout_default_s, 30);
        assert_eq!(cfg.timeouts.cancel_timeout_s, 15);
        assert_eq!(cfg.transport.backpressure_queue_size, 64);
    }
}
