use tonic::Code;

/// Message prefix the server uses for NOT_FOUND caused by a lost lock.
const LOCK_LOST_PREFIX: &str = "lock lost";

/// Common gRPC status errors shared across all operations.
///
/// The "infra" error that every per-operation type embeds via `#[from]`.
/// These are the failures worth retrying.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("server unavailable: {0}")]
    Unavailable(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("unexpected gRPC error ({code:?}): {message}")]
    Rpc { code: Code, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("connection string has no Endpoint")]
    MissingEndpoint,

    #[error("malformed connection string segment \"{0}\"")]
    MalformedSegment(String),

    #[error("endpoint must be an http:// or https:// URL, got \"{0}\"")]
    InvalidEndpoint(String),
}

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection failed: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    ConnectionString(#[from] ConnectionStringError),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid receiver options: {0}")]
    InvalidOptions(String),

    #[error("receive failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: StatusError },

    #[error(transparent)]
    Status(#[from] StatusError),
}

impl ReceiveError {
    /// Whether retrying the same call cannot succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReceiveError::Status(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettleError {
    /// The lease is unknown, already settled, or expired.
    #[error("lock lost: {0}")]
    LockLost(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error(transparent)]
    Status(#[from] StatusError),
}

// --- Mapping helpers ---

pub(crate) fn status_error(status: tonic::Status) -> StatusError {
    let message = status.message().to_string();
    match status.code() {
        Code::InvalidArgument => StatusError::InvalidArgument(message),
        Code::Unavailable => StatusError::Unavailable(message),
        Code::Internal => StatusError::Internal(message),
        code => StatusError::Rpc { code, message },
    }
}

pub(crate) fn send_status_error(status: tonic::Status) -> SendError {
    let message = status.message().to_string();
    match status.code() {
        Code::NotFound => SendError::EntityNotFound(message),
        Code::Unauthenticated => SendError::Unauthorized(message),
        _ => SendError::Status(status_error(status)),
    }
}

pub(crate) fn receive_status_error(status: tonic::Status) -> ReceiveError {
    let message = status.message().to_string();
    match status.code() {
        Code::NotFound => ReceiveError::EntityNotFound(message),
        Code::Unauthenticated => ReceiveError::Unauthorized(message),
        _ => ReceiveError::Status(status_error(status)),
    }
}

pub(crate) fn settle_status_error(status: tonic::Status) -> SettleError {
    let message = status.message().to_string();
    match status.code() {
        Code::NotFound if message.starts_with(LOCK_LOST_PREFIX) => SettleError::LockLost(message),
        Code::NotFound => SettleError::EntityNotFound(message),
        Code::Unauthenticated => SettleError::Unauthorized(message),
        Code::FailedPrecondition => SettleError::NotSupported(message),
        _ => SettleError::Status(status_error(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Status;

    #[test]
    fn not_found_splits_on_lock_lost_prefix() {
        assert!(matches!(
            settle_status_error(Status::not_found("lock lost: no lock x on orders")),
            SettleError::LockLost(_)
        ));
        assert!(matches!(
            settle_status_error(Status::not_found("entity not found: orders")),
            SettleError::EntityNotFound(_)
        ));
    }

    #[test]
    fn unauthenticated_is_fatal_for_receive() {
        let err = receive_status_error(Status::unauthenticated("invalid shared access key"));
        assert!(matches!(err, ReceiveError::Unauthorized(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn unavailable_is_retryable() {
        let err = receive_status_error(Status::unavailable("connection refused"));
        assert!(matches!(
            err,
            ReceiveError::Status(StatusError::Unavailable(_))
        ));
        assert!(!err.is_fatal());
    }
}
