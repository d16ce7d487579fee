use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::{Config, MqttTransport};

/// Where configuration values came from, for startup logging (`--show-config`).
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
    pub env_overrides: Vec<String>,
}

const ENV_PREFIX: &str = "MISSION_DISPATCH_";

pub fn load(cli_path: Option<&Path>) -> Result<(Config, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();
    let mut config = Config::default();

    if let Some(path) = discover_config_file(cli_path) {
        config = load_from_file(&path)?;
        sources.files.push(path);
    }

    apply_env_overrides(&mut config, &mut sources)?;

    Ok((config, sources))
}

/// Standard locations, in increasing precedence: system, user, CLI/local.
fn discover_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    let local = PathBuf::from("mission-dispatch.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(dirs) = directories::BaseDirs::new() {
        let user = dirs.config_dir().join("mission-dispatch/config.toml");
        if user.exists() {
            return Some(user);
        }
    }

    let system = PathBuf::from("/etc/mission-dispatch/config.toml");
    if system.exists() {
        return Some(system);
    }

    None
}

fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn apply_env_overrides(config: &mut Config, sources: &mut ConfigSources) -> Result<(), ConfigError> {
    macro_rules! overlay_str {
        ($env_key:expr, $field:expr) => {
            if let Ok(value) = env::var($env_key) {
                $field = value;
                sources.env_overrides.push($env_key.to_string());
            }
        };
    }
    macro_rules! overlay_parsed {
        ($env_key:expr, $field:expr, $ty:ty) => {
            if let Ok(value) = env::var($env_key) {
                $field = value.parse::<$ty>().map_err(|e| ConfigError::InvalidEnvOverride {
                    key: $env_key.to_string(),
                    message: e.to_string(),
                })?;
                sources.env_overrides.push($env_key.to_string());
            }
        };
    }

    overlay_str!(env_key("MQTT__HOST"), config.mqtt.host);
    overlay_parsed!(env_key("MQTT__PORT"), config.mqtt.port, u16);
    overlay_str!(env_key("MQTT__PREFIX"), config.mqtt.prefix);
    overlay_str!(env_key("MQTT__MANUFACTURER"), config.mqtt.manufacturer);
    overlay_str!(env_key("MQTT__INTERFACE_VERSION"), config.mqtt.interface_version);
    overlay_str!(env_key("MQTT__WS_PATH"), config.mqtt.ws_path);
    if let Ok(value) = env::var(env_key("MQTT__TRANSPORT")) {
        config.mqtt.transport = match value.as_str() {
            "tcp" => MqttTransport::Tcp,
            "websockets" => MqttTransport::Websockets,
            other => {
                return Err(ConfigError::InvalidEnvOverride {
                    key: env_key("MQTT__TRANSPORT"),
                    message: format!("expected tcp|websockets, got {other}"),
                })
            }
        };
        sources.env_overrides.push(env_key("MQTT__TRANSPORT"));
    }

    overlay_str!(env_key("DATABASE_URL"), config.database_url);
    overlay_parsed!(
        env_key("HEARTBEAT_TIMEOUT_DEFAULT_S"),
        config.timeouts.heartbeat_timeout_default_s,
        u64
    );
    overlay_parsed!(env_key("CANCEL_TIMEOUT_S"), config.timeouts.cancel_timeout_s, u64);
    overlay_parsed!(env_key("RESUME_TIMEOUT_S"), config.timeouts.resume_timeout_s, u64);
    overlay_parsed!(
        env_key("BACKPRESSURE_QUEUE_SIZE"),
        config.transport.backpressure_queue_size,
        usize
    );
    overlay_str!(env_key("LOG_FILTER"), config.ambient.log_filter);
    overlay_str!(env_key("HEALTH_BIND_ADDR"), config.ambient.health_bind_addr);
    overlay_parsed!(
        env_key("STATUS_FLUSH_INTERVAL_MS"),
        config.ambient.status_flush_interval_ms,
        u64
    );

    Ok(())
}

fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_apply_then_env_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "database_url = \"http://store.internal:8080\"").unwrap();
        writeln!(f, "[mqtt]\nhost = \"broker.internal\"\nport = 8883").unwrap();
        drop(f);

        std::env::set_var(env_key("MQTT__PORT"), "9001");
        let (config, sources) = load(Some(&path)).unwrap();
        std::env::remove_var(env_key("MQTT__PORT"));

        assert_eq!(config.database_url, "http://store.internal:8080");
        assert_eq!(config.mqtt.host, "broker.internal");
        assert_eq!(config.mqtt.port, 9001);
        assert_eq!(sources.files, vec![path]);
        assert!(sources.env_overrides.contains(&env_key("MQTT__PORT")));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let (config, sources) = load(Some(Path::new("/nonexistent/mission-dispatch.toml"))).unwrap();
        assert_eq!(config.mqtt.port, 1883);
        assert!(sources.files.is_empty());
    }
}
