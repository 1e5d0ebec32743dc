use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lockstep_core::{Broker, EntityPath, LockedMessage, Message, PropertyValue, SchedulerCommand};
use lockstep_proto::lockstep_service_server::LockstepService;
use lockstep_proto::property_value::Kind;
use lockstep_proto::{
    CheckEntityRequest, CheckEntityResponse, DeadLetterRequest, ReceiveRequest, ReceiveResponse,
    RenewLockResponse, SendRequest, SendResponse, SettleRequest, SettleResponse,
};
use tokio::sync::oneshot;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::IntoStatus;

/// Wait applied to receive calls that ask for zero.
pub const DEFAULT_WAIT_MS: u32 = 5_000;
/// Upper bound on how long a receive call is held open.
pub const MAX_WAIT_MS: u32 = 60_000;

/// gRPC service for producers and peek-lock consumers.
pub struct LockstepGrpc {
    broker: Arc<Broker>,
}

impl LockstepGrpc {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Hand a command to the scheduler and wait for its reply.
    async fn dispatch<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> Result<T, Status> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.broker
            .send_command(command(reply_tx))
            .map_err(IntoStatus::into_status)?;

        reply_rx
            .await
            .map_err(|_| Status::internal("scheduler reply channel dropped"))
    }
}

fn path_from_proto(path: Option<lockstep_proto::EntityPath>) -> Result<EntityPath, Status> {
    let path = path.ok_or_else(|| Status::invalid_argument("entity path is required"))?;
    if path.entity.is_empty() {
        return Err(Status::invalid_argument("entity name must not be empty"));
    }

    Ok(EntityPath {
        entity: path.entity,
        subscription: (!path.subscription.is_empty()).then_some(path.subscription),
        dead_letter: path.dead_letter,
    })
}

fn lock_token_from_proto(token: &str) -> Result<Uuid, Status> {
    if token.is_empty() {
        return Err(Status::invalid_argument("lock_token must not be empty"));
    }
    token
        .parse()
        .map_err(|_| Status::invalid_argument("invalid lock_token format"))
}

fn properties_from_proto(
    properties: Vec<lockstep_proto::Property>,
) -> Result<Vec<(String, PropertyValue)>, Status> {
    properties
        .into_iter()
        .map(|property| -> Result<(String, PropertyValue), Status> {
            let kind = property
                .value
                .and_then(|v| v.kind)
                .ok_or_else(|| {
                    Status::invalid_argument(format!("property \"{}\" has no value", property.key))
                })?;
            let value = match kind {
                Kind::StringValue(s) => PropertyValue::String(s),
                Kind::IntValue(n) => PropertyValue::Int(n),
                Kind::DoubleValue(n) => PropertyValue::Double(n),
                Kind::BoolValue(b) => PropertyValue::Bool(b),
                Kind::TimestampMs(ms) => DateTime::from_timestamp_millis(ms)
                    .map(PropertyValue::Timestamp)
                    .ok_or_else(|| {
                        Status::invalid_argument(format!(
                            "property \"{}\" timestamp out of range",
                            property.key
                        ))
                    })?,
            };
            Ok((property.key, value))
        })
        .collect()
}

fn property_to_proto(key: String, value: PropertyValue) -> lockstep_proto::Property {
    let kind = match value {
        PropertyValue::String(s) => Kind::StringValue(s),
        PropertyValue::Int(n) => Kind::IntValue(n),
        PropertyValue::Double(n) => Kind::DoubleValue(n),
        PropertyValue::Bool(b) => Kind::BoolValue(b),
        PropertyValue::Timestamp(ts) => Kind::TimestampMs(ts.timestamp_millis()),
    };
    lockstep_proto::Property {
        key,
        value: Some(lockstep_proto::PropertyValue { kind: Some(kind) }),
    }
}

/// Convert a leased message to its wire form.
fn locked_to_proto(locked: LockedMessage) -> lockstep_proto::Message {
    let LockedMessage {
        message,
        lock_token,
        locked_until,
    } = locked;

    lockstep_proto::Message {
        id: message.id,
        lock_token: lock_token.to_string(),
        body: message.body,
        properties: message
            .properties
            .into_iter()
            .map(|(k, v)| property_to_proto(k, v))
            .collect(),
        content_type: message.content_type.unwrap_or_default(),
        delivery_count: message.delivery_count,
        sequence_number: message.sequence_number,
        enqueued_at_ms: message.enqueued_at.timestamp_millis(),
        locked_until_ms: locked_until.timestamp_millis(),
    }
}

fn receive_wait(wait_ms: u32) -> Duration {
    let wait_ms = if wait_ms == 0 {
        DEFAULT_WAIT_MS
    } else {
        wait_ms.min(MAX_WAIT_MS)
    };
    Duration::from_millis(u64::from(wait_ms))
}

#[tonic::async_trait]
impl LockstepService for LockstepGrpc {
    #[instrument(skip_all)]
    async fn send(&self, request: Request<SendRequest>) -> Result<Response<SendResponse>, Status> {
        let req = request.into_inner();

        if req.entity.is_empty() {
            return Err(Status::invalid_argument("entity name must not be empty"));
        }

        let message = Message {
            id: req.message_id,
            sequence_number: 0,
            body: req.body,
            properties: properties_from_proto(req.properties)?,
            content_type: (!req.content_type.is_empty()).then_some(req.content_type),
            delivery_count: 0,
            enqueued_at: Utc::now(),
        };

        let entity = req.entity;
        let message_id = self
            .dispatch(|reply| SchedulerCommand::Send {
                entity,
                message,
                reply,
            })
            .await?
            .map_err(IntoStatus::into_status)?;

        Ok(Response::new(SendResponse { message_id }))
    }

    #[instrument(skip_all)]
    async fn check_entity(
        &self,
        request: Request<CheckEntityRequest>,
    ) -> Result<Response<CheckEntityResponse>, Status> {
        let path = path_from_proto(request.into_inner().path)?;

        let info = self
            .dispatch(|reply| SchedulerCommand::CheckEntity { path, reply })
            .await?
            .map_err(IntoStatus::into_status)?;

        Ok(Response::new(CheckEntityResponse {
            lock_duration_ms: info.lock_duration_ms,
        }))
    }

    #[instrument(skip_all)]
    async fn receive(
        &self,
        request: Request<ReceiveRequest>,
    ) -> Result<Response<ReceiveResponse>, Status> {
        let req = request.into_inner();
        let path = path_from_proto(req.path)?;
        let wait = receive_wait(req.wait_ms);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.broker
            .send_command(SchedulerCommand::Receive {
                path: path.clone(),
                reply: reply_tx,
            })
            .map_err(IntoStatus::into_status)?;

        let result = match tokio::time::timeout(wait, &mut reply_rx).await {
            Ok(result) => {
                result.map_err(|_| Status::internal("scheduler reply channel dropped"))?
            }
            Err(_) => {
                // Close first so a delivery racing the timeout is either
                // kept here or rolled back by the scheduler.
                reply_rx.close();
                match reply_rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(%path, "receive wait elapsed without a message");
                        return Ok(Response::new(ReceiveResponse { message: None }));
                    }
                }
            }
        };

        let locked = result.map_err(IntoStatus::into_status)?;
        debug!(%path, msg_id = %locked.message.id, "message delivered");
        Ok(Response::new(ReceiveResponse {
            message: Some(locked_to_proto(locked)),
        }))
    }

    #[instrument(skip_all)]
    async fn complete(
        &self,
        request: Request<SettleRequest>,
    ) -> Result<Response<SettleResponse>, Status> {
        let req = request.into_inner();
        let path = path_from_proto(req.path)?;
        let lock_token = lock_token_from_proto(&req.lock_token)?;

        self.dispatch(|reply| SchedulerCommand::Complete {
            path,
            lock_token,
            reply,
        })
        .await?
        .map_err(IntoStatus::into_status)?;

        Ok(Response::new(SettleResponse {}))
    }

    #[instrument(skip_all)]
    async fn abandon(
        &self,
        request: Request<SettleRequest>,
    ) -> Result<Response<SettleResponse>, Status> {
        let req = request.into_inner();
        let path = path_from_proto(req.path)?;
        let lock_token = lock_token_from_proto(&req.lock_token)?;

        self.dispatch(|reply| SchedulerCommand::Abandon {
            path,
            lock_token,
            reply,
        })
        .await?
        .map_err(IntoStatus::into_status)?;

        Ok(Response::new(SettleResponse {}))
    }

    #[instrument(skip_all)]
    async fn dead_letter(
        &self,
        request: Request<DeadLetterRequest>,
    ) -> Result<Response<SettleResponse>, Status> {
        let req = request.into_inner();
        let path = path_from_proto(req.path)?;
        let lock_token = lock_token_from_proto(&req.lock_token)?;

        self.dispatch(|reply| SchedulerCommand::DeadLetter {
            path,
            lock_token,
            reason: req.reason,
            description: req.description,
            reply,
        })
        .await?
        .map_err(IntoStatus::into_status)?;

        Ok(Response::new(SettleResponse {}))
    }

    #[instrument(skip_all)]
    async fn renew_lock(
        &self,
        request: Request<SettleRequest>,
    ) -> Result<Response<RenewLockResponse>, Status> {
        let req = request.into_inner();
        let path = path_from_proto(req.path)?;
        let lock_token = lock_token_from_proto(&req.lock_token)?;

        let locked_until = self
            .dispatch(|reply| SchedulerCommand::RenewLock {
                path,
                lock_token,
                reply,
            })
            .await?
            .map_err(IntoStatus::into_status)?;

        Ok(Response::new(RenewLockResponse {
            locked_until_ms: locked_until.timestamp_millis(),
        }))
    }
}
