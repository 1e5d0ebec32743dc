use lockstep_core::{BrokerError, ReceiveError, SendError, SettleError};
use tonic::Status;

pub trait IntoStatus {
    fn into_status(self) -> Status;
}

// Unknown entities and lost locks share NOT_FOUND; clients tell them apart
// by the "entity not found:" / "lock lost:" message prefixes.

impl IntoStatus for SendError {
    fn into_status(self) -> Status {
        match self {
            SendError::EntityNotFound(_) => Status::not_found(self.to_string()),
        }
    }
}

impl IntoStatus for ReceiveError {
    fn into_status(self) -> Status {
        match self {
            ReceiveError::EntityNotFound(_) => Status::not_found(self.to_string()),
        }
    }
}

impl IntoStatus for SettleError {
    fn into_status(self) -> Status {
        match self {
            SettleError::EntityNotFound(_) | SettleError::LockLost(_) => {
                Status::not_found(self.to_string())
            }
            SettleError::NotSupported(msg) => Status::failed_precondition(msg),
        }
    }
}

impl IntoStatus for BrokerError {
    fn into_status(self) -> Status {
        match self {
            BrokerError::SchedulerSpawn(msg) => Status::internal(msg),
            BrokerError::ChannelFull => Status::resource_exhausted("scheduler overloaded"),
            BrokerError::ChannelDisconnected => Status::unavailable("scheduler unavailable"),
            BrokerError::SchedulerPanicked => Status::internal("scheduler panicked"),
            BrokerError::InvalidConfig(msg) => Status::invalid_argument(msg),
        }
    }
}
