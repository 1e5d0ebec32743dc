use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::{BrokerClient, EntityDescriptor, ReceiveOptions, ReceiveStream, SubQueue};
use crate::console::Console;
use crate::error::ReaderError;
use crate::gate::AdmissionGate;
use crate::input::OperatorInput;
use crate::interrupt;
use crate::policy::{Resolution, ResolutionOutcome, ResolutionPolicy};

/// How long to let the error reporter drain after the receiver closes.
const ERROR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Counts per outcome for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub acknowledged: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub skipped: usize,
    /// Resolutions whose broker call failed.
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, resolution: &Resolution) {
        if !resolution.applied {
            self.failed += 1;
            return;
        }
        match resolution.outcome {
            ResolutionOutcome::Acknowledged => self.acknowledged += 1,
            ResolutionOutcome::Requeued => self.requeued += 1,
            ResolutionOutcome::DeadLettered { .. } => self.dead_lettered += 1,
            ResolutionOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.acknowledged + self.requeued + self.dead_lettered + self.skipped + self.failed
    }
}

/// Receives and resolves messages strictly one at a time.
pub struct SequentialProcessor<C, I> {
    client: C,
    policy: ResolutionPolicy<I>,
    console: Console,
    gate: AdmissionGate,
    cancel: CancellationToken,
}

impl<C, I> SequentialProcessor<C, I>
where
    C: BrokerClient,
    I: OperatorInput,
{
    pub fn new(
        client: C,
        policy: ResolutionPolicy<I>,
        console: Console,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            policy,
            console,
            gate: AdmissionGate::new(),
            cancel,
        }
    }

    /// Share an admission gate with other processors.
    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = gate;
        self
    }

    /// Process until cancelled, the stream ends, or a fatal client error.
    /// The receiver is closed on every exit path once it has been opened.
    #[tracing::instrument(skip_all, fields(entity = %entity))]
    pub async fn run(
        &mut self,
        entity: &EntityDescriptor,
        options: ReceiveOptions,
    ) -> Result<RunSummary, ReaderError> {
        let sub_queue = options.sub_queue;
        let mut stream = self.client.open_receiver(entity, options).await?;
        let reporter = stream
            .take_errors()
            .map(|errors| interrupt::spawn_error_reporter(errors, self.console.clone()));

        info!("message processor started");
        self.announce(entity, sub_queue);

        let result = self.drain(&mut stream).await;
        stream.close().await;

        if let Some(reporter) = reporter {
            if tokio::time::timeout(ERROR_DRAIN_TIMEOUT, reporter).await.is_err() {
                warn!("error reporter did not finish after the receiver closed");
            }
        }

        match &result {
            Ok(summary) => info!(
                acknowledged = summary.acknowledged,
                requeued = summary.requeued,
                dead_lettered = summary.dead_lettered,
                skipped = summary.skipped,
                failed = summary.failed,
                "message processor stopped"
            ),
            Err(e) => error!(error = %e, "message processor failed"),
        }
        result
    }

    async fn drain<S: ReceiveStream>(&mut self, stream: &mut S) -> Result<RunSummary, ReaderError> {
        let mut summary = RunSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("cancellation requested, stopping");
                    break;
                }
                next = stream.next() => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("receive stream ended");
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "receive failed, continuing");
                    continue;
                }
            };

            let _permit = self.gate.acquire().await;
            let resolution = self.policy.resolve(&*stream, &message).await;
            info!(
                msg_id = %resolution.message_id,
                outcome = %resolution.outcome,
                delivery_count = message.delivery_count,
                decision = ?resolution.decision,
                applied = resolution.applied,
                "message resolved"
            );
            summary.record(&resolution);
        }

        Ok(summary)
    }

    fn announce(&self, entity: &EntityDescriptor, sub_queue: SubQueue) {
        let target = match sub_queue {
            SubQueue::Active => entity.to_string(),
            SubQueue::DeadLetter => format!("dead-letter queue of {entity}"),
        };
        let lines = [
            format!("Message processor started for {target}."),
            "Waiting for messages... Press Ctrl+C to stop.".to_string(),
        ];
        for line in lines {
            if let Err(e) = self.console.line(line) {
                warn!(error = %e, "console write failed");
            }
        }
    }
}
