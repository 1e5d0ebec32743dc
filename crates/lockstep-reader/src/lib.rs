//! Interactive peek-lock consumer.
//!
//! Messages are pulled from a [`broker::ReceiveStream`] one at a time by the
//! [`processor::SequentialProcessor`], shown to an operator, and resolved by
//! the [`policy::ResolutionPolicy`] with exactly one broker action each.

pub mod broker;
pub mod choice;
pub mod config;
pub mod console;
pub mod error;
pub mod gate;
pub mod input;
pub mod interrupt;
pub mod policy;
pub mod present;
pub mod processor;
pub mod select;

pub use broker::{
    BrokerClient, ClientError, DeliveredMessage, EntityDescriptor, ReceiveOptions, ReceiveStream,
    ReceiverSettings, SdkBroker, SubQueue, TransportError,
};
pub use choice::{parse_choice, OperatorChoice, PromptResult};
pub use config::ReaderConfig;
pub use console::Console;
pub use error::{ConfigError, PromptError, ReaderError};
pub use gate::AdmissionGate;
pub use input::{ChannelInput, OperatorInput};
pub use policy::{Decision, LeaseRenewal, Resolution, ResolutionOutcome, ResolutionPolicy};
pub use processor::{RunSummary, SequentialProcessor};
