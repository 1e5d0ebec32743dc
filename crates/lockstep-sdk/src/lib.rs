mod client;
mod connection;
mod error;
mod message;
mod receiver;

pub use client::{ConnectOptions, LockstepClient};
pub use connection::ConnectionString;
pub use error::{
    ConnectError, ConnectionStringError, ReceiveError, SendError, SettleError, StatusError,
};
pub use message::{EntityPath, OutgoingMessage, PropertyValue, ReceivedMessage};
pub use receiver::{ErrorEvent, ErrorSource, Receiver, ReceiverOptions};

/// Re-export the proto types for advanced usage.
pub use lockstep_proto as proto;
