use chrono::{DateTime, Utc};
use lockstep_sdk::OutgoingMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const CONTENT_TYPE: &str = "application/json";
pub const MESSAGE_TYPE: &str = "SampleText";

const SAMPLE_TEXTS: [&str; 8] = [
    "Hello from the lockstep pusher",
    "Processing batch data",
    "System health check completed",
    "Scheduled report is ready",
    "Automated workflow triggered",
    "Data synchronization in progress",
    "Background job finished",
    "Inventory levels updated",
];

/// Sample text for the `sequence`-th message of a run.
pub fn sample_text(sequence: u64) -> &'static str {
    SAMPLE_TEXTS[(sequence % SAMPLE_TEXTS.len() as u64) as usize]
}

/// JSON body of every pushed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Equals the broker message id.
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Envelope {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
            source: source.into(),
            message_id: Uuid::new_v4().to_string(),
            category: None,
            priority: None,
            metadata: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: Option<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// The broker message: compact JSON body plus the routing properties.
    pub fn to_message(&self) -> Result<OutgoingMessage, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        let mut message = OutgoingMessage::new(body)
            .with_id(self.message_id.as_str())
            .with_content_type(CONTENT_TYPE)
            .with_property("Source", self.source.as_str())
            .with_property("ExecutionTime", Utc::now())
            .with_property("MessageType", MESSAGE_TYPE);

        if let Some(ref category) = self.category {
            message = message.with_property("Category", category.as_str());
        }
        if let Some(ref priority) = self.priority {
            message = message.with_property("Priority", priority.as_str());
        }
        Ok(message)
    }
}
