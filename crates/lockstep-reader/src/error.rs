use std::io;
use std::path::PathBuf;

use crate::broker::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no connection string configured (set LOCKSTEP_CONNECTION_STRING or connection_string)")]
    MissingConnectionString,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure while asking the operator for a decision.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("console write failed: {0}")]
    Console(#[source] io::Error),

    #[error("operator input failed: {0}")]
    Input(#[source] io::Error),

    #[error("operator input closed")]
    InputClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to broker: {0}")]
    Connect(#[from] lockstep_sdk::ConnectError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}
