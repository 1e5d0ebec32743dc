use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::EntityPath;
use crate::error::{ReceiveError, SendError, SettleError};
use crate::message::Message;

/// A message handed to a consumer under a lease.
#[derive(Debug, Clone)]
pub struct LockedMessage {
    pub message: Message,
    /// Identifies this delivery attempt. Required to settle or renew.
    pub lock_token: Uuid,
    pub locked_until: DateTime<Utc>,
}

/// Static facts about a receivable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityInfo {
    pub lock_duration_ms: u64,
}

/// Commands sent from IO tasks to the single-threaded scheduler core.
///
/// Each variant that expects a response includes a `tokio::sync::oneshot::Sender`
/// for the reply.
pub enum SchedulerCommand {
    Send {
        /// Queue or topic name.
        entity: String,
        message: Message,
        reply: tokio::sync::oneshot::Sender<Result<String, SendError>>,
    },
    CheckEntity {
        path: EntityPath,
        reply: tokio::sync::oneshot::Sender<Result<EntityInfo, ReceiveError>>,
    },
    /// Lease the next available message. The reply is held until a message
    /// arrives; callers drop the receiver to give up waiting.
    Receive {
        path: EntityPath,
        reply: tokio::sync::oneshot::Sender<Result<LockedMessage, ReceiveError>>,
    },
    Complete {
        path: EntityPath,
        lock_token: Uuid,
        reply: tokio::sync::oneshot::Sender<Result<(), SettleError>>,
    },
    Abandon {
        path: EntityPath,
        lock_token: Uuid,
        reply: tokio::sync::oneshot::Sender<Result<(), SettleError>>,
    },
    DeadLetter {
        path: EntityPath,
        lock_token: Uuid,
        reason: String,
        description: String,
        reply: tokio::sync::oneshot::Sender<Result<(), SettleError>>,
    },
    RenewLock {
        path: EntityPath,
        lock_token: Uuid,
        reply: tokio::sync::oneshot::Sender<Result<DateTime<Utc>, SettleError>>,
    },
    Shutdown,
}
