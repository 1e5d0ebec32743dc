use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use lockstep_proto::property_value::Kind;

/// Path segment that addresses the dead-letter sub-queue of an entity.
const DEAD_LETTER_SEGMENT: &str = "$deadletterqueue";

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

    pub fn dead_letter_queue(&self) -> Self {
        Self {
            dead_letter: true,
            ..self.clone()
        }
    }

    pub(crate) fn to_proto(&self) -> lockstep_proto::EntityPath {
        lockstep_proto::EntityPath {
            entity: self.entity.clone(),
            subscription: self.subscription.clone().unwrap_or_default(),
            dead_letter: self.dead_letter,
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

/// Scalar value of an application property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    pub(crate) fn to_proto(&self) -> lockstep_proto::PropertyValue {
        let kind = match self {
            PropertyValue::String(s) => Kind::StringValue(s.clone()),
            PropertyValue::Int(n) => Kind::IntValue(*n),
            PropertyValue::Double(n) => Kind::DoubleValue(*n),
            PropertyValue::Bool(b) => Kind::BoolValue(*b),
            PropertyValue::Timestamp(ts) => Kind::TimestampMs(ts.timestamp_millis()),
        };
        lockstep_proto::PropertyValue { kind: Some(kind) }
    }

    /// Values the client cannot represent come back as `None`.
    pub(crate) fn from_proto(value: lockstep_proto::PropertyValue) -> Option<Self> {
        Some(match value.kind? {
            Kind::StringValue(s) => PropertyValue::String(s),
            Kind::IntValue(n) => PropertyValue::Int(n),
            Kind::DoubleValue(n) => PropertyValue::Double(n),
            Kind::BoolValue(b) => PropertyValue::Bool(b),
            Kind::TimestampMs(ms) => PropertyValue::Timestamp(DateTime::from_timestamp_millis(ms)?),
        })
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Int(n) => write!(f, "{n}"),
            PropertyValue::Double(n) => write!(f, "{n}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(value)
    }
}

/// A message received under a peek-lock lease.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub id: String,
    /// Lease handle of this delivery attempt.
    pub lock_token: String,
    pub body: Vec<u8>,
    pub properties: Vec<(String, PropertyValue)>,
    pub content_type: Option<String>,
    pub delivery_count: u32,
    pub sequence_number: u64,
    pub enqueued_at: DateTime<Utc>,
    pub locked_until: DateTime<Utc>,
}

impl ReceivedMessage {
    pub(crate) fn from_proto(msg: lockstep_proto::Message) -> Self {
        Self {
            id: msg.id,
            lock_token: msg.lock_token,
            body: msg.body,
            properties: msg
                .properties
                .into_iter()
                .filter_map(|p| Some((p.key, PropertyValue::from_proto(p.value?)?)))
                .collect(),
            content_type: (!msg.content_type.is_empty()).then_some(msg.content_type),
            delivery_count: msg.delivery_count,
            sequence_number: msg.sequence_number,
            enqueued_at: DateTime::from_timestamp_millis(msg.enqueued_at_ms).unwrap_or_default(),
            locked_until: DateTime::from_timestamp_millis(msg.locked_until_ms).unwrap_or_default(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// A message to send. The broker assigns an id when none is set.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub id: Option<String>,
    pub body: Vec<u8>,
    pub properties: Vec<(String, PropertyValue)>,
    pub content_type: Option<String>,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_paths_render_broker_style() {
        assert_eq!(EntityPath::queue("orders").to_string(), "orders");
        assert_eq!(
            EntityPath::subscription("events", "audit")
                .dead_letter_queue()
                .to_string(),
            "events/subscriptions/audit/$deadletterqueue"
        );
    }

    #[test]
    fn received_message_skips_empty_properties() {
        let msg = ReceivedMessage::from_proto(lockstep_proto::Message {
            id: "m1".into(),
            lock_token: "t".into(),
            body: b"x".to_vec(),
            properties: vec![
                lockstep_proto::Property {
                    key: "Source".into(),
                    value: Some(PropertyValue::from("timer").to_proto()),
                },
                lockstep_proto::Property {
                    key: "Broken".into(),
                    value: None,
                },
            ],
            content_type: String::new(),
            delivery_count: 2,
            sequence_number: 7,
            enqueued_at_ms: 1_700_000_000_000,
            locked_until_ms: 1_700_000_030_000,
        });
        assert_eq!(msg.properties.len(), 1);
        assert_eq!(msg.property("Source"), Some(&PropertyValue::from("timer")));
        assert_eq!(msg.content_type, None);
        assert_eq!(msg.enqueued_at.timestamp_millis(), 1_700_000_000_000);
    }
}
