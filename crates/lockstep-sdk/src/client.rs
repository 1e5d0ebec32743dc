use std::time::Duration;

use chrono::{DateTime, Utc};
use lockstep_proto::lockstep_service_client::LockstepServiceClient;
use lockstep_proto::{
    CheckEntityRequest, DeadLetterRequest, ReceiveRequest, SendRequest, SettleRequest,
};
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::connection::ConnectionString;
use crate::error::{
    receive_status_error, send_status_error, settle_status_error, ConnectError, ReceiveError,
    SendError, SettleError,
};
use crate::message::{EntityPath, OutgoingMessage, ReceivedMessage};
use crate::receiver::{Receiver, ReceiverOptions};

/// Options for connecting to a lockstep broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub endpoint: String,
    pub shared_access_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            shared_access_key: None,
            timeout: None,
        }
    }

    pub fn with_shared_access_key(mut self, key: impl Into<String>) -> Self {
        self.shared_access_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<ConnectionString> for ConnectOptions {
    fn from(cs: ConnectionString) -> Self {
        Self {
            endpoint: cs.endpoint,
            shared_access_key: cs.shared_access_key,
            timeout: None,
        }
    }
}

/// Attaches `authorization: SharedAccessKey <key>` to every call.
#[derive(Debug, Clone)]
pub(crate) struct SharedKeyHeader {
    value: Option<MetadataValue<Ascii>>,
}

impl Interceptor for SharedKeyHeader {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(ref value) = self.value {
            request
                .metadata_mut()
                .insert("authorization", value.clone());
        }
        Ok(request)
    }
}

type Inner = LockstepServiceClient<InterceptedService<Channel, SharedKeyHeader>>;

/// Client for the lockstep broker.
///
/// Wraps the peek-lock gRPC operations: send, receive, complete, abandon,
/// dead-letter, renew-lock. The client is `Clone`, `Send`, and `Sync`, so
/// it can be shared across tasks.
#[derive(Clone)]
pub struct LockstepClient {
    inner: Inner,
}

impl LockstepClient {
    /// Connect using an `Endpoint=...;SharedAccessKey=...` connection string.
    pub async fn connect(connection_string: &str) -> Result<Self, ConnectError> {
        let cs: ConnectionString = connection_string.parse()?;
        Self::connect_with_options(cs.into()).await
    }

    /// Connect to a lockstep broker with custom options.
    pub async fn connect_with_options(options: ConnectOptions) -> Result<Self, ConnectError> {
        let mut endpoint = Channel::from_shared(options.endpoint)
            .map_err(|e| ConnectError::InvalidArgument(e.to_string()))?;

        if let Some(timeout) = options.timeout {
            endpoint = endpoint.timeout(timeout);
        }

        let value = options
            .shared_access_key
            .map(|key| format!("SharedAccessKey {key}").parse::<MetadataValue<Ascii>>())
            .transpose()
            .map_err(|_| {
                ConnectError::InvalidArgument("shared access key is not valid ASCII".to_string())
            })?;

        let channel = endpoint.connect().await?;
        let inner = LockstepServiceClient::with_interceptor(channel, SharedKeyHeader { value });
        Ok(Self { inner })
    }

    /// Send a message to a queue or topic. Returns the message id.
    pub async fn send(&self, entity: &str, message: OutgoingMessage) -> Result<String, SendError> {
        let response = self
            .inner
            .clone()
            .send(SendRequest {
                entity: entity.to_string(),
                message_id: message.id.unwrap_or_default(),
                body: message.body,
                properties: message
                    .properties
                    .iter()
                    .map(|(key, value)| lockstep_proto::Property {
                        key: key.clone(),
                        value: Some(value.to_proto()),
                    })
                    .collect(),
                content_type: message.content_type.unwrap_or_default(),
            })
            .await
            .map_err(send_status_error)?;

        Ok(response.into_inner().message_id)
    }

    /// Verify that `path` can be received from. Returns its lock duration.
    pub async fn check_entity(&self, path: &EntityPath) -> Result<Duration, ReceiveError> {
        let response = self
            .inner
            .clone()
            .check_entity(CheckEntityRequest {
                path: Some(path.to_proto()),
            })
            .await
            .map_err(receive_status_error)?;

        Ok(Duration::from_millis(response.into_inner().lock_duration_ms))
    }

    /// Long-poll for one message, waiting at most `wait` on the server.
    /// `Ok(None)` means the wait elapsed without a delivery.
    pub async fn receive(
        &self,
        path: &EntityPath,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, ReceiveError> {
        let wait_ms = u32::try_from(wait.as_millis()).unwrap_or(u32::MAX);
        let response = self
            .inner
            .clone()
            .receive(ReceiveRequest {
                path: Some(path.to_proto()),
                wait_ms,
            })
            .await
            .map_err(receive_status_error)?;

        Ok(response
            .into_inner()
            .message
            .map(ReceivedMessage::from_proto))
    }

    /// Settle a message as processed; it is removed from the entity.
    pub async fn complete(&self, path: &EntityPath, lock_token: &str) -> Result<(), SettleError> {
        self.inner
            .clone()
            .complete(settle_request(path, lock_token))
            .await
            .map_err(settle_status_error)?;
        Ok(())
    }

    /// Release the lease; the message is immediately redeliverable.
    pub async fn abandon(&self, path: &EntityPath, lock_token: &str) -> Result<(), SettleError> {
        self.inner
            .clone()
            .abandon(settle_request(path, lock_token))
            .await
            .map_err(settle_status_error)?;
        Ok(())
    }

    /// Move the message to the dead-letter sub-queue of `path`.
    pub async fn dead_letter(
        &self,
        path: &EntityPath,
        lock_token: &str,
        reason: &str,
        description: &str,
    ) -> Result<(), SettleError> {
        self.inner
            .clone()
            .dead_letter(DeadLetterRequest {
                path: Some(path.to_proto()),
                lock_token: lock_token.to_string(),
                reason: reason.to_string(),
                description: description.to_string(),
            })
            .await
            .map_err(settle_status_error)?;
        Ok(())
    }

    /// Extend the lease. Returns the new expiry.
    pub async fn renew_lock(
        &self,
        path: &EntityPath,
        lock_token: &str,
    ) -> Result<DateTime<Utc>, SettleError> {
        let response = self
            .inner
            .clone()
            .renew_lock(settle_request(path, lock_token))
            .await
            .map_err(settle_status_error)?;

        Ok(DateTime::from_timestamp_millis(response.into_inner().locked_until_ms)
            .unwrap_or_default())
    }

    /// Open a receiver on `path`. Fails fast when the entity does not exist,
    /// credentials are rejected, or the options are unsupported.
    #[tracing::instrument(skip(self, options), fields(entity = %path))]
    pub async fn receiver(
        &self,
        path: EntityPath,
        options: ReceiverOptions,
    ) -> Result<Receiver, ReceiveError> {
        options.validate()?;
        self.check_entity(&path).await?;
        Ok(Receiver::new(self.clone(), path, options))
    }
}

fn settle_request(path: &EntityPath, lock_token: &str) -> SettleRequest {
    SettleRequest {
        path: Some(path.to_proto()),
        lock_token: lock_token.to_string(),
    }
}
