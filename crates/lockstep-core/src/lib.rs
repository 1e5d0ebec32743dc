pub mod broker;
pub mod entity;
pub mod error;
pub mod message;
pub mod telemetry;

pub use broker::{Broker, BrokerConfig, EntityInfo, LockedMessage, SchedulerCommand};
pub use entity::{EntityPath, QueueConfig, TopicConfig};
pub use error::{BrokerError, BrokerResult, ReceiveError, SendError, SettleError};
pub use message::{Message, PropertyValue};
