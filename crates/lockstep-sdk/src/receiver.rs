use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::LockstepClient;
use crate::error::{ReceiveError, SettleError};
use crate::message::{EntityPath, ReceivedMessage};

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Receiver settings.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Messages handed out at once. Only 1 is supported.
    pub max_concurrent: usize,
    /// Complete each message as soon as it is received.
    pub auto_complete: bool,
    /// How long one receive call waits on the server.
    pub wait: Duration,
    /// Consecutive transient failures tolerated before `next` gives up.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            auto_complete: false,
            wait: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ReceiverOptions {
    pub(crate) fn validate(&self) -> Result<(), ReceiveError> {
        if self.max_concurrent != 1 {
            return Err(ReceiveError::InvalidOptions(format!(
                "max_concurrent must be 1, got {}",
                self.max_concurrent
            )));
        }
        if self.wait.is_zero() {
            return Err(ReceiveError::InvalidOptions(
                "wait must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which receiver operation produced an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Receive,
    AutoComplete,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Receive => f.write_str("receive"),
            ErrorSource::AutoComplete => f.write_str("auto-complete"),
        }
    }
}

/// A transport failure observed in the background of `next`.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub source: ErrorSource,
    pub entity_path: String,
    pub message: String,
}

/// Pull-based peek-lock receiver bound to one entity path.
///
/// Transient receive failures are retried transparently and reported on
/// the error channel (see [`Receiver::take_errors`]).
pub struct Receiver {
    client: LockstepClient,
    path: EntityPath,
    options: ReceiverOptions,
    errors_tx: Option<mpsc::Sender<ErrorEvent>>,
    errors_rx: Option<mpsc::Receiver<ErrorEvent>>,
}

impl Receiver {
    pub(crate) fn new(client: LockstepClient, path: EntityPath, options: ReceiverOptions) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            client,
            path,
            options,
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
        }
    }

    pub fn path(&self) -> &EntityPath {
        &self.path
    }

    /// The error event channel. Available once; it ends when the receiver
    /// is closed or dropped.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<ErrorEvent>> {
        self.errors_rx.take()
    }

    pub fn is_closed(&self) -> bool {
        self.errors_tx.is_none()
    }

    /// Wait for the next message. `Ok(None)` once the receiver is closed.
    ///
    /// Transient failures are retried up to `max_retries` consecutive times;
    /// unknown entities and rejected credentials fail immediately.
    pub async fn next(&mut self) -> Result<Option<ReceivedMessage>, ReceiveError> {
        let mut failures = 0;

        loop {
            if self.is_closed() {
                return Ok(None);
            }

            match self.client.receive(&self.path, self.options.wait).await {
                Ok(Some(message)) => {
                    if self.options.auto_complete {
                        self.auto_complete(&message).await;
                    }
                    return Ok(Some(message));
                }
                Ok(None) => {
                    failures = 0;
                }
                Err(ReceiveError::Status(status)) => {
                    failures += 1;
                    self.report(ErrorSource::Receive, status.to_string());

                    if failures > self.options.max_retries {
                        return Err(ReceiveError::RetriesExhausted {
                            attempts: failures,
                            last: status,
                        });
                    }

                    debug!(entity = %self.path, failures, "receive failed, retrying");
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    pub async fn complete(&self, message: &ReceivedMessage) -> Result<(), SettleError> {
        self.client.complete(&self.path, &message.lock_token).await
    }

    pub async fn abandon(&self, message: &ReceivedMessage) -> Result<(), SettleError> {
        self.client.abandon(&self.path, &message.lock_token).await
    }

    pub async fn dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), SettleError> {
        self.client
            .dead_letter(&self.path, &message.lock_token, reason, description)
            .await
    }

    pub async fn renew_lock(&self, message: &ReceivedMessage) -> Result<DateTime<Utc>, SettleError> {
        self.client.renew_lock(&self.path, &message.lock_token).await
    }

    /// Stop receiving. Outstanding leases are left to expire.
    pub fn close(&mut self) {
        if self.errors_tx.take().is_some() {
            debug!(entity = %self.path, "receiver closed");
        }
    }

    async fn auto_complete(&self, message: &ReceivedMessage) {
        if let Err(e) = self.complete(message).await {
            self.report(ErrorSource::AutoComplete, e.to_string());
        }
    }

    fn report(&self, source: ErrorSource, message: String) {
        let Some(ref tx) = self.errors_tx else {
            return;
        };
        let event = ErrorEvent {
            source,
            entity_path: self.path.to_string(),
            message,
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
            warn!(entity = %self.path, %source, "error channel full, dropping event");
        }
    }
}
