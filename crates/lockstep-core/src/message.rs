use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Property set on dead-lettered messages: why the message was rejected.
pub const DEAD_LETTER_REASON: &str = "DeadLetterReason";
/// Property set on dead-lettered messages: free-form detail.
pub const DEAD_LETTER_DESCRIPTION: &str = "DeadLetterErrorDescription";
/// Reason recorded when the broker dead-letters a message on its own.
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Scalar value of an application property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
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

/// Core message domain type held by the scheduler. Distinct from the
/// protobuf wire type.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    /// Position within the owning queue, assigned on arrival.
    pub sequence_number: u64,
    pub body: Vec<u8>,
    /// Application properties in producer order.
    pub properties: Vec<(String, PropertyValue)>,
    pub content_type: Option<String>,
    /// Number of delivery attempts so far. Zero until first leased.
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    /// Generate a new UUIDv7 message ID.
    pub fn new_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Build a fresh message as a producer would send it.
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            sequence_number: 0,
            body: body.into(),
            properties: Vec::new(),
            content_type: None,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn property_values_display_plainly() {
        assert_eq!(PropertyValue::from("abc").to_string(), "abc");
        assert_eq!(PropertyValue::Int(-7).to_string(), "-7");
        assert_eq!(PropertyValue::Bool(true).to_string(), "true");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            PropertyValue::Timestamp(ts).to_string(),
            "2024-03-01T12:30:00.000Z"
        );
    }

    #[test]
    fn property_lookup_returns_first_match() {
        let mut msg = Message::new("m1", b"{}".to_vec());
        msg.properties.push(("Source".into(), "timer".into()));
        msg.properties.push(("Source".into(), "other".into()));
        assert_eq!(msg.property("Source"), Some(&PropertyValue::from("timer")));
        assert_eq!(msg.property("Missing"), None);
    }
}
