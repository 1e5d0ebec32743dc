use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::broker::{DeliveredMessage, ReceiveStream};
use crate::choice::{parse_choice, OperatorChoice, PromptResult, ACTION_MENU, INVALID_CHOICE};
use crate::console::Console;
use crate::error::PromptError;
use crate::input::OperatorInput;
use crate::present;

pub const DEAD_LETTER_REASON: &str = "User requested";
pub const DEAD_LETTER_DESCRIPTION: &str = "Message moved to dead letter queue by user choice";

/// Lower bound on the spacing of renewals, even for a lock about to expire.
const MIN_RENEWAL_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Acknowledged,
    Requeued,
    DeadLettered { reason: String, description: String },
    /// The lease is left to expire.
    Skipped,
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionOutcome::Acknowledged => f.write_str("acknowledged"),
            ResolutionOutcome::Requeued => f.write_str("requeued"),
            ResolutionOutcome::DeadLettered { .. } => f.write_str("dead-lettered"),
            ResolutionOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

impl From<OperatorChoice> for ResolutionOutcome {
    fn from(choice: OperatorChoice) -> Self {
        match choice {
            OperatorChoice::Acknowledge => ResolutionOutcome::Acknowledged,
            OperatorChoice::Requeue => ResolutionOutcome::Requeued,
            OperatorChoice::DeadLetter => ResolutionOutcome::DeadLettered {
                reason: DEAD_LETTER_REASON.to_string(),
                description: DEAD_LETTER_DESCRIPTION.to_string(),
            },
            OperatorChoice::Skip => ResolutionOutcome::Skipped,
        }
    }
}

/// Who picked the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Operator,
    FailSafe,
}

/// What happened to one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub message_id: String,
    pub outcome: ResolutionOutcome,
    pub decision: Decision,
    /// Whether the broker accepted the action. Always true for a skip.
    pub applied: bool,
}

/// Keeps a lease alive while the operator is deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseRenewal {
    /// Zero disables renewal.
    pub interval: Duration,
    pub max_duration: Duration,
}

impl Default for LeaseRenewal {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_duration: Duration::from_secs(300),
        }
    }
}

impl LeaseRenewal {
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }

    /// Delay before the next renewal: half the lock time left, never more
    /// than `interval`.
    fn next_delay(&self, locked_until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = (locked_until - now).to_std().unwrap_or(Duration::ZERO);
        (remaining / 2).max(MIN_RENEWAL_DELAY).min(self.interval)
    }

    /// Renew ahead of each expiry until `max_duration` has passed or a
    /// renewal fails, then return.
    async fn keep_alive<S>(self, stream: &S, message: &DeliveredMessage)
    where
        S: ReceiveStream + ?Sized,
    {
        if self.interval.is_zero() {
            return;
        }
        let deadline = Instant::now() + self.max_duration;
        let mut locked_until = message.locked_until;

        loop {
            tokio::time::sleep(self.next_delay(locked_until, Utc::now())).await;
            if Instant::now() >= deadline {
                debug!(msg_id = %message.id, "lease renewal window elapsed");
                return;
            }
            match stream.renew_lease(message).await {
                Ok(until) => {
                    debug!(msg_id = %message.id, locked_until = %until, "lease renewed");
                    locked_until = until;
                }
                Err(e) => {
                    warn!(msg_id = %message.id, error = %e, "lease renewal failed, no longer renewing");
                    return;
                }
            }
        }
    }
}

/// Presents each delivery to the operator and applies exactly one outcome.
pub struct ResolutionPolicy<I> {
    input: I,
    console: Console,
    renewal: LeaseRenewal,
    cancel: CancellationToken,
}

impl<I: OperatorInput> ResolutionPolicy<I> {
    /// `cancel` is triggered when operator input ends.
    pub fn new(input: I, console: Console, renewal: LeaseRenewal, cancel: CancellationToken) -> Self {
        Self {
            input,
            console,
            renewal,
            cancel,
        }
    }

    pub async fn resolve<S>(&mut self, stream: &S, message: &DeliveredMessage) -> Resolution
    where
        S: ReceiveStream + ?Sized,
    {
        match self.decide(stream, message).await {
            Ok(choice) => execute(&self.console, stream, message, choice).await,
            Err(err) => {
                let resolution = fail_safe(&self.console, stream, message, &err).await;
                if matches!(err, PromptError::InputClosed) {
                    say(&self.console, "Operator input closed, shutting down.");
                    self.cancel.cancel();
                }
                resolution
            }
        }
    }

    async fn decide<S>(
        &mut self,
        stream: &S,
        message: &DeliveredMessage,
    ) -> Result<OperatorChoice, PromptError>
    where
        S: ReceiveStream + ?Sized,
    {
        self.console
            .write(&present::render(message))
            .map_err(PromptError::Console)?;

        let renewal = self.renewal.keep_alive(stream, message);
        tokio::pin!(renewal);
        let prompt = prompt_choice(&mut self.input, &self.console);
        tokio::pin!(prompt);

        let mut renewing = true;
        loop {
            tokio::select! {
                choice = &mut prompt => return choice,
                () = &mut renewal, if renewing => renewing = false,
            }
        }
    }
}

/// Console output after a decision is best effort.
fn say(console: &Console, text: impl AsRef<str>) {
    if let Err(e) = console.line(text) {
        warn!(error = %e, "console write failed");
    }
}

async fn execute<S>(
    console: &Console,
    stream: &S,
    message: &DeliveredMessage,
    choice: OperatorChoice,
) -> Resolution
where
    S: ReceiveStream + ?Sized,
{
    let outcome = ResolutionOutcome::from(choice);
    let result = match &outcome {
        ResolutionOutcome::Acknowledged => stream.acknowledge(message).await,
        ResolutionOutcome::Requeued => stream.requeue(message).await,
        ResolutionOutcome::DeadLettered {
            reason,
            description,
        } => stream.dead_letter(message, reason, description).await,
        ResolutionOutcome::Skipped => Ok(()),
    };

    let applied = match result {
        Ok(()) => {
            say(console, confirmation(&outcome));
            true
        }
        Err(e) => {
            error!(msg_id = %message.id, action = %choice, error = %e, "failed to execute action");
            say(console, format!("Failed to {choice} message: {e}"));
            say(console, "The lock will expire and the message will be redelivered.");
            false
        }
    };
    say(console, present::separator());
    say(console, "Waiting for the next message...");

    Resolution {
        message_id: message.id.clone(),
        outcome,
        decision: Decision::Operator,
        applied,
    }
}

/// Requeue a message the operator could not decide on.
async fn fail_safe<S>(
    console: &Console,
    stream: &S,
    message: &DeliveredMessage,
    err: &PromptError,
) -> Resolution
where
    S: ReceiveStream + ?Sized,
{
    error!(msg_id = %message.id, error = %err, "could not get a decision, requeueing message");
    say(console, format!("Error while processing message: {err}"));
    say(console, "The message will be returned to the queue.");

    let applied = match stream.requeue(message).await {
        Ok(()) => true,
        Err(e) => {
            error!(msg_id = %message.id, error = %e, "fail-safe requeue failed");
            false
        }
    };

    Resolution {
        message_id: message.id.clone(),
        outcome: ResolutionOutcome::Requeued,
        decision: Decision::FailSafe,
        applied,
    }
}

async fn prompt_choice<I>(input: &mut I, console: &Console) -> Result<OperatorChoice, PromptError>
where
    I: OperatorInput + ?Sized,
{
    loop {
        console.prompt(ACTION_MENU).map_err(PromptError::Console)?;
        let line = input
            .read_line()
            .await
            .map_err(PromptError::Input)?
            .ok_or(PromptError::InputClosed)?;

        match parse_choice(&line) {
            PromptResult::Choice(choice) => return Ok(choice),
            PromptResult::RetryInput => {
                console.line(INVALID_CHOICE).map_err(PromptError::Console)?;
            }
        }
    }
}

fn confirmation(outcome: &ResolutionOutcome) -> &'static str {
    match outcome {
        ResolutionOutcome::Acknowledged => "Message completed and removed from the queue.",
        ResolutionOutcome::Requeued => "Message abandoned and returned to the queue.",
        ResolutionOutcome::DeadLettered { .. } => "Message moved to the dead-letter queue.",
        ResolutionOutcome::Skipped => "Message skipped. It stays locked until the lock expires.",
    }
}
