use std::fmt;

use serde::Deserialize;

/// Path segment that addresses the dead-letter sub-queue of an entity.
pub const DEAD_LETTER_SEGMENT: &str = "$deadletterqueue";

/// Addresses a receivable entity: a queue, or one subscription of a topic,
/// optionally its dead-letter sub-queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityPath {
    pub entity: String,
    pub subscription: Option<String>,
    pub dead_letter: bool,
}

impl EntityPath {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            entity: name.into(),
            subscription: None,
            dead_letter: false,
        }
    }

    pub fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            entity: topic.into(),
            subscription: Some(subscription.into()),
            dead_letter: false,
        }
    }

    /// The dead-letter sub-queue of this entity.
    pub fn dead_letter_queue(&self) -> Self {
        Self {
            dead_letter: true,
            ..self.clone()
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity)?;
        if let Some(ref subscription) = self.subscription {
            write!(f, "/subscriptions/{subscription}")?;
        }
        if self.dead_letter {
            write!(f, "/{DEAD_LETTER_SEGMENT}")?;
        }
        Ok(())
    }
}

/// Configuration of a queue, or of a topic subscription (which behaves as a
/// queue fed by the topic).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueueConfig {
    pub name: String,
    /// How long a delivered message stays locked before it is redelivered.
    #[serde(default = "QueueConfig::default_lock_duration_ms")]
    pub lock_duration_ms: u64,
    /// Deliveries allowed before the broker dead-letters the message itself.
    #[serde(default = "QueueConfig::default_max_delivery_count")]
    pub max_delivery_count: u32,
}

impl QueueConfig {
    /// Default lock duration: 30 seconds.
    pub const DEFAULT_LOCK_DURATION_MS: u64 = 30_000;
    pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock_duration_ms: Self::DEFAULT_LOCK_DURATION_MS,
            max_delivery_count: Self::DEFAULT_MAX_DELIVERY_COUNT,
        }
    }

    pub fn with_lock_duration_ms(mut self, lock_duration_ms: u64) -> Self {
        self.lock_duration_ms = lock_duration_ms;
        self
    }

    pub fn with_max_delivery_count(mut self, max_delivery_count: u32) -> Self {
        self.max_delivery_count = max_delivery_count;
        self
    }

    fn default_lock_duration_ms() -> u64 {
        Self::DEFAULT_LOCK_DURATION_MS
    }

    fn default_max_delivery_count() -> u32 {
        Self::DEFAULT_MAX_DELIVERY_COUNT
    }
}

/// A topic fans every message out to each of its subscriptions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub subscriptions: Vec<QueueConfig>,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: Vec::new(),
        }
    }

    pub fn with_subscription(mut self, subscription: QueueConfig) -> Self {
        self.subscriptions.push(subscription);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_path_display() {
        assert_eq!(EntityPath::queue("orders").to_string(), "orders");
        assert_eq!(
            EntityPath::queue("orders").dead_letter_queue().to_string(),
            "orders/$deadletterqueue"
        );
    }

    #[test]
    fn subscription_path_display() {
        let path = EntityPath::subscription("events", "audit");
        assert_eq!(path.to_string(), "events/subscriptions/audit");
        assert_eq!(
            path.dead_letter_queue().to_string(),
            "events/subscriptions/audit/$deadletterqueue"
        );
    }
}
