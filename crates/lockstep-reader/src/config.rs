use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::broker::ReceiverSettings;
use crate::error::ConfigError;
use crate::policy::LeaseRenewal;

/// Read when no `--config` is given; a missing file means defaults.
pub const DEFAULT_CONFIG_PATH: &str = "lockstep-reader.toml";

pub const ENV_CONNECTION_STRING: &str = "LOCKSTEP_CONNECTION_STRING";
pub const ENV_QUEUE: &str = "LOCKSTEP_QUEUE";
pub const ENV_TOPIC: &str = "LOCKSTEP_TOPIC";
pub const ENV_SUBSCRIPTION: &str = "LOCKSTEP_SUBSCRIPTION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub connection_string: Option<String>,
    pub default_queue: String,
    pub default_topic: String,
    pub default_subscription: String,
    pub receiver: ReceiverConfig,
    pub lease_renewal: LeaseRenewalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Long-poll duration of one receive call.
    pub wait_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseRenewalConfig {
    /// 0 disables renewal.
    pub interval_ms: u64,
    pub max_duration_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            default_queue: "lockstep-queue".to_string(),
            default_topic: "lockstep-topic".to_string(),
            default_subscription: "lockstep-subscription".to_string(),
            receiver: ReceiverConfig::default(),
            lease_renewal: LeaseRenewalConfig::default(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            wait_ms: 5_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl Default for LeaseRenewalConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            max_duration_ms: 300_000,
        }
    }
}

impl ReaderConfig {
    /// File, then environment overrides, then validation of the result.
    pub fn load_with_env<F>(explicit: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load(explicit)?;
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, which must exist, or from
    /// [`DEFAULT_CONFIG_PATH`] when present. Values are not validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if !path.exists() {
                    debug!("no reader config file found, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded reader configuration");
        Ok(config)
    }

    /// Apply environment overrides. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_CONNECTION_STRING) {
            self.connection_string = Some(value);
        }
        if let Some(value) = get(ENV_QUEUE) {
            self.default_queue = value;
        }
        if let Some(value) = get(ENV_TOPIC) {
            self.default_topic = value;
        }
        if let Some(value) = get(ENV_SUBSCRIPTION) {
            self.default_subscription = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receiver.wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "receiver.wait_ms must be positive".to_string(),
            ));
        }
        if self.lease_renewal.interval_ms > 0 && self.lease_renewal.max_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "lease_renewal.max_duration_ms must be positive when renewal is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection_string(&self) -> Result<&str, ConfigError> {
        self.connection_string
            .as_deref()
            .filter(|cs| !cs.trim().is_empty())
            .ok_or(ConfigError::MissingConnectionString)
    }

    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            wait: Duration::from_millis(self.receiver.wait_ms),
            max_retries: self.receiver.max_retries,
            retry_delay: Duration::from_millis(self.receiver.retry_delay_ms),
        }
    }

    pub fn lease_renewal(&self) -> LeaseRenewal {
        LeaseRenewal {
            interval: Duration::from_millis(self.lease_renewal.interval_ms),
            max_duration: Duration::from_millis(self.lease_renewal.max_duration_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(
            &path,
            r#"
                connection_string = "Endpoint=http://127.0.0.1:5680"
                default_queue = "orders"

                [receiver]
                max_retries = 5

                [lease_renewal]
                interval_ms = 0
            "#,
        )
        .unwrap();

        let config = ReaderConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.connection_string().unwrap(),
            "Endpoint=http://127.0.0.1:5680"
        );
        assert_eq!(config.default_queue, "orders");
        assert_eq!(config.default_topic, "lockstep-topic");
        assert_eq!(config.receiver_settings().max_retries, 5);
        assert_eq!(config.receiver_settings().wait, Duration::from_secs(5));
        assert!(config.lease_renewal().interval.is_zero());
    }

    #[test]
    fn environment_overrides_file_and_ignores_blanks() {
        let env: HashMap<&str, &str> = [
            (ENV_CONNECTION_STRING, "Endpoint=http://broker:5680;SharedAccessKey=k"),
            (ENV_TOPIC, "events"),
            (ENV_SUBSCRIPTION, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = ReaderConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.connection_string().unwrap(),
            "Endpoint=http://broker:5680;SharedAccessKey=k"
        );
        assert_eq!(config.default_topic, "events");
        assert_eq!(config.default_subscription, "lockstep-subscription");
        assert_eq!(config.default_queue, "lockstep-queue");
    }

    #[test]
    fn validation_runs_after_environment_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(&path, "[lease_renewal]\nmax_duration_ms = 0\n").unwrap();

        let env = |key: &str| (key == ENV_QUEUE).then(|| "orders".to_string());
        let err = ReaderConfig::load_with_env(Some(&path), env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");

        std::fs::write(&path, "[lease_renewal]\ninterval_ms = 0\nmax_duration_ms = 0\n").unwrap();
        let config = ReaderConfig::load_with_env(Some(&path), env).unwrap();
        assert_eq!(config.default_queue, "orders");
    }

    #[test]
    fn missing_connection_string_is_a_config_error() {
        let config = ReaderConfig::default();
        assert!(matches!(
            config.connection_string(),
            Err(ConfigError::MissingConnectionString)
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(&path, "[receiver]\nwait_ms = 0\n").unwrap();
        assert!(matches!(
            ReaderConfig::load_with_env(Some(&path), |_| None),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "default_queue = 7\n").unwrap();
        assert!(matches!(
            ReaderConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));

        assert!(matches!(
            ReaderConfig::load(Some(&dir.path().join("absent.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
