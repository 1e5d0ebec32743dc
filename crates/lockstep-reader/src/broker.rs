use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockstep_sdk::{EntityPath, LockstepClient, PropertyValue, ReceivedMessage, Receiver};
use tokio::sync::mpsc;
use tracing::debug;

const ERROR_FORWARD_CAPACITY: usize = 64;

/// The entity a reader consumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityDescriptor {
    Queue { name: String },
    Topic { name: String, subscription: String },
}

impl EntityDescriptor {
    pub fn queue(name: impl Into<String>) -> Self {
        EntityDescriptor::Queue { name: name.into() }
    }

    pub fn topic(name: impl Into<String>, subscription: impl Into<String>) -> Self {
        EntityDescriptor::Topic {
            name: name.into(),
            subscription: subscription.into(),
        }
    }

    /// Broker path of this entity, or of its dead-letter sub-queue.
    pub fn path(&self, sub_queue: SubQueue) -> EntityPath {
        let path = match self {
            EntityDescriptor::Queue { name } => EntityPath::queue(name.as_str()),
            EntityDescriptor::Topic { name, subscription } => {
                EntityPath::subscription(name.as_str(), subscription.as_str())
            }
        };
        match sub_queue {
            SubQueue::Active => path,
            SubQueue::DeadLetter => path.dead_letter_queue(),
        }
    }
}

impl fmt::Display for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityDescriptor::Queue { name } => write!(f, "queue '{name}'"),
            EntityDescriptor::Topic { name, subscription } => {
                write!(f, "topic '{name}' subscription '{subscription}'")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubQueue {
    #[default]
    Active,
    DeadLetter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub max_concurrent: usize,
    pub auto_complete: bool,
    pub sub_queue: SubQueue,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            auto_complete: false,
            sub_queue: SubQueue::Active,
        }
    }
}

/// A message held under a lease for one processing cycle.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub id: String,
    pub lock_token: String,
    pub body: Vec<u8>,
    pub properties: Vec<(String, PropertyValue)>,
    pub content_type: Option<String>,
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub locked_until: DateTime<Utc>,
}

impl From<ReceivedMessage> for DeliveredMessage {
    fn from(msg: ReceivedMessage) -> Self {
        Self {
            id: msg.id,
            lock_token: msg.lock_token,
            body: msg.body,
            properties: msg.properties,
            content_type: msg.content_type,
            delivery_count: msg.delivery_count,
            enqueued_at: msg.enqueued_at,
            locked_until: msg.locked_until,
        }
    }
}

/// Asynchronous failure reported by the client outside of a call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub source: String,
    pub entity_path: String,
    pub message: String,
}

impl From<lockstep_sdk::ErrorEvent> for TransportError {
    fn from(event: lockstep_sdk::ErrorEvent) -> Self {
        Self {
            source: event.source.to_string(),
            entity_path: event.entity_path,
            message: event.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid receive options: {0}")]
    InvalidOptions(String),

    #[error("receive failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("lock lost: {0}")]
    LockLost(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether the receive loop cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::EntityNotFound(_)
                | ClientError::Unauthorized(_)
                | ClientError::InvalidOptions(_)
                | ClientError::RetriesExhausted { .. }
        )
    }
}

impl From<lockstep_sdk::ReceiveError> for ClientError {
    fn from(err: lockstep_sdk::ReceiveError) -> Self {
        use lockstep_sdk::ReceiveError;
        match err {
            ReceiveError::EntityNotFound(m) => ClientError::EntityNotFound(m),
            ReceiveError::Unauthorized(m) => ClientError::Unauthorized(m),
            ReceiveError::InvalidOptions(m) => ClientError::InvalidOptions(m),
            ReceiveError::RetriesExhausted { attempts, last } => ClientError::RetriesExhausted {
                attempts,
                message: last.to_string(),
            },
            ReceiveError::Status(status) => ClientError::Transport(status.to_string()),
        }
    }
}

impl From<lockstep_sdk::SettleError> for ClientError {
    fn from(err: lockstep_sdk::SettleError) -> Self {
        use lockstep_sdk::SettleError;
        match err {
            SettleError::LockLost(m) => ClientError::LockLost(m),
            SettleError::EntityNotFound(m) => ClientError::EntityNotFound(m),
            SettleError::Unauthorized(m) => ClientError::Unauthorized(m),
            SettleError::NotSupported(m) => ClientError::NotSupported(m),
            SettleError::Status(status) => ClientError::Transport(status.to_string()),
        }
    }
}

/// Opens receive streams on broker entities.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    type Stream: ReceiveStream;

    async fn open_receiver(
        &self,
        entity: &EntityDescriptor,
        options: ReceiveOptions,
    ) -> Result<Self::Stream, ClientError>;
}

/// A peek-lock receiver. Every message it yields must be settled through
/// the same stream or left to expire.
#[async_trait]
pub trait ReceiveStream: Send + Sync {
    /// Suspends until a message is leased. `Ok(None)` once the stream is closed.
    async fn next(&mut self) -> Result<Option<DeliveredMessage>, ClientError>;

    async fn acknowledge(&self, message: &DeliveredMessage) -> Result<(), ClientError>;

    async fn requeue(&self, message: &DeliveredMessage) -> Result<(), ClientError>;

    async fn dead_letter(
        &self,
        message: &DeliveredMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ClientError>;

    /// Extend the lease. Returns the new expiry.
    async fn renew_lease(&self, message: &DeliveredMessage) -> Result<DateTime<Utc>, ClientError>;

    /// Transport error events. Available once.
    fn take_errors(&mut self) -> Option<mpsc::Receiver<TransportError>>;

    async fn close(&mut self);
}

/// Receiver tuning that the abstract options do not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSettings {
    pub wait: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        let sdk = lockstep_sdk::ReceiverOptions::default();
        Self {
            wait: sdk.wait,
            max_retries: sdk.max_retries,
            retry_delay: sdk.retry_delay,
        }
    }
}

/// [`BrokerClient`] backed by the lockstep gRPC client.
#[derive(Clone)]
pub struct SdkBroker {
    client: LockstepClient,
    settings: ReceiverSettings,
}

impl SdkBroker {
    pub fn new(client: LockstepClient, settings: ReceiverSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl BrokerClient for SdkBroker {
    type Stream = SdkReceiveStream;

    async fn open_receiver(
        &self,
        entity: &EntityDescriptor,
        options: ReceiveOptions,
    ) -> Result<SdkReceiveStream, ClientError> {
        let path = entity.path(options.sub_queue);
        let sdk_options = lockstep_sdk::ReceiverOptions {
            max_concurrent: options.max_concurrent,
            auto_complete: options.auto_complete,
            wait: self.settings.wait,
            max_retries: self.settings.max_retries,
            retry_delay: self.settings.retry_delay,
        };
        let receiver = self.client.receiver(path, sdk_options).await?;
        debug!(entity = %receiver.path(), "receiver opened");
        Ok(SdkReceiveStream {
            client: self.client.clone(),
            receiver,
        })
    }
}

/// Pulls through the SDK receiver; settles by lock token on the same path.
pub struct SdkReceiveStream {
    client: LockstepClient,
    receiver: Receiver,
}

#[async_trait]
impl ReceiveStream for SdkReceiveStream {
    async fn next(&mut self) -> Result<Option<DeliveredMessage>, ClientError> {
        Ok(self.receiver.next().await?.map(DeliveredMessage::from))
    }

    async fn acknowledge(&self, message: &DeliveredMessage) -> Result<(), ClientError> {
        self.client
            .complete(self.receiver.path(), &message.lock_token)
            .await?;
        Ok(())
    }

    async fn requeue(&self, message: &DeliveredMessage) -> Result<(), ClientError> {
        self.client
            .abandon(self.receiver.path(), &message.lock_token)
            .await?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &DeliveredMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ClientError> {
        self.client
            .dead_letter(self.receiver.path(), &message.lock_token, reason, description)
            .await?;
        Ok(())
    }

    async fn renew_lease(&self, message: &DeliveredMessage) -> Result<DateTime<Utc>, ClientError> {
        Ok(self
            .client
            .renew_lock(self.receiver.path(), &message.lock_token)
            .await?)
    }

    fn take_errors(&mut self) -> Option<mpsc::Receiver<TransportError>> {
        let mut events = self.receiver.take_errors()?;
        let (tx, rx) = mpsc::channel(ERROR_FORWARD_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(TransportError::from(event)).await.is_err() {
                    break;
                }
            }
        });
        Some(rx)
    }

    async fn close(&mut self) {
        self.receiver.close();
    }
}
