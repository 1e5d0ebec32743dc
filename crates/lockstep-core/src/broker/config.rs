use std::collections::HashSet;

use serde::Deserialize;

use crate::entity::{QueueConfig, TopicConfig};
use crate::error::{BrokerError, BrokerResult};

/// Top-level broker configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub auth: AuthConfig,
    pub queues: Vec<QueueConfig>,
    pub topics: Vec<TopicConfig>,
}

/// Server configuration (gRPC listen address).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

/// Scheduler configuration (channel capacity, idle timeout).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub command_channel_capacity: usize,
    /// How long the scheduler parks waiting for a command. Expired leases are
    /// reclaimed at least this often.
    pub idle_timeout_ms: u64,
}

/// Shared-key authentication. An empty key list disables authentication.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub shared_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5680".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 10_000,
            idle_timeout_ms: 100,
        }
    }
}

impl BrokerConfig {
    /// Reject entity declarations the scheduler cannot serve: empty or
    /// duplicate names, zero lock durations, zero delivery limits.
    pub fn validate(&self) -> BrokerResult<()> {
        let mut names = HashSet::new();

        for queue in &self.queues {
            validate_queue(queue)?;
            if !names.insert(queue.name.as_str()) {
                return Err(BrokerError::InvalidConfig(format!(
                    "duplicate entity name \"{}\"",
                    queue.name
                )));
            }
        }

        for topic in &self.topics {
            if topic.name.trim().is_empty() {
                return Err(BrokerError::InvalidConfig(
                    "topic name must not be empty".to_string(),
                ));
            }
            if !names.insert(topic.name.as_str()) {
                return Err(BrokerError::InvalidConfig(format!(
                    "duplicate entity name \"{}\"",
                    topic.name
                )));
            }

            let mut subscriptions = HashSet::new();
            for subscription in &topic.subscriptions {
                validate_queue(subscription)?;
                if !subscriptions.insert(subscription.name.as_str()) {
                    return Err(BrokerError::InvalidConfig(format!(
                        "duplicate subscription \"{}\" on topic \"{}\"",
                        subscription.name, topic.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_queue(queue: &QueueConfig) -> BrokerResult<()> {
    if queue.name.trim().is_empty() {
        return Err(BrokerError::InvalidConfig(
            "entity name must not be empty".to_string(),
        ));
    }
    if queue.name.contains('/') {
        return Err(BrokerError::InvalidConfig(format!(
            "entity name \"{}\" must not contain '/'",
            queue.name
        )));
    }
    if queue.lock_duration_ms == 0 {
        return Err(BrokerError::InvalidConfig(format!(
            "lock_duration_ms of \"{}\" must be positive",
            queue.name
        )));
    }
    if queue.max_delivery_count == 0 {
        return Err(BrokerError::InvalidConfig(format!(
            "max_delivery_count of \"{}\" must be positive",
            queue.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = BrokerConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:5680");
        assert_eq!(config.scheduler.command_channel_capacity, 10_000);
        assert_eq!(config.scheduler.idle_timeout_ms, 100);
        assert!(config.auth.shared_keys.is_empty());
        assert!(config.queues.is_empty());
        assert!(config.topics.is_empty());
    }

    #[test]
    fn toml_parsing_with_entities() {
        let toml_str = r#"
            [server]
            listen_addr = "127.0.0.1:9999"

            [auth]
            shared_keys = ["secret"]

            [[queues]]
            name = "orders"
            lock_duration_ms = 5000

            [[topics]]
            name = "events"

            [[topics.subscriptions]]
            name = "audit"
            max_delivery_count = 3
        "#;
        let config: BrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.auth.shared_keys, vec!["secret".to_string()]);
        assert_eq!(config.queues.len(), 1);
        assert_eq!(config.queues[0].lock_duration_ms, 5000);
        assert_eq!(
            config.queues[0].max_delivery_count,
            QueueConfig::DEFAULT_MAX_DELIVERY_COUNT
        );
        assert_eq!(config.topics[0].subscriptions[0].name, "audit");
        assert_eq!(config.topics[0].subscriptions[0].max_delivery_count, 3);
        assert_eq!(
            config.topics[0].subscriptions[0].lock_duration_ms,
            QueueConfig::DEFAULT_LOCK_DURATION_MS
        );
        config.validate().unwrap();
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:5680");
        assert_eq!(config.scheduler.idle_timeout_ms, 100);
        config.validate().unwrap();
    }

    #[test]
    fn duplicate_entity_names_rejected() {
        let config = BrokerConfig {
            queues: vec![QueueConfig::new("orders")],
            topics: vec![TopicConfig::new("orders")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BrokerError::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn duplicate_subscriptions_rejected() {
        let config = BrokerConfig {
            topics: vec![TopicConfig::new("events")
                .with_subscription(QueueConfig::new("audit"))
                .with_subscription(QueueConfig::new("audit"))],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_lock_duration_rejected() {
        let config = BrokerConfig {
            queues: vec![QueueConfig::new("orders").with_lock_duration_ms(0)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn slash_in_name_rejected() {
        let config = BrokerConfig {
            queues: vec![QueueConfig::new("a/b")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
