/// Errors raised by the broker itself (scheduler lifecycle, configuration).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(String),

    #[error("scheduler command channel full")]
    ChannelFull,

    #[error("scheduler command channel disconnected")]
    ChannelDisconnected,

    #[error("scheduler thread panicked")]
    SchedulerPanicked,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// --- Per-operation error types ---

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

/// Errors for complete / abandon / dead-letter / renew-lock.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// The lease is unknown, already settled, or expired.
    #[error("lock lost: {0}")]
    LockLost(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
