#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lockstep_reader::console::Captured;
use lockstep_reader::{
    BrokerClient, ClientError, Console, DeliveredMessage, EntityDescriptor, LeaseRenewal,
    OperatorInput, ReceiveOptions, ReceiveStream, ResolutionPolicy, SequentialProcessor,
    TransportError,
};
use lockstep_sdk::PropertyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Broker calls observed by the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Acknowledge(String),
    Requeue(String),
    DeadLetter {
        id: String,
        reason: String,
        description: String,
    },
    Renew(String),
    Close,
}

#[derive(Default)]
struct Shared {
    messages: Mutex<VecDeque<DeliveredMessage>>,
    calls: Mutex<Vec<Call>>,
    opened: Mutex<Vec<(EntityDescriptor, ReceiveOptions)>>,
    hold_open: Mutex<bool>,
    fail_settlement: Mutex<bool>,
    fail_renewal: Mutex<bool>,
    next_errors: Mutex<VecDeque<ClientError>>,
    open_error: Mutex<Option<ClientError>>,
    error_events: Mutex<Option<mpsc::Receiver<TransportError>>>,
}

/// In-memory broker that hands out a fixed list of messages.
#[derive(Clone, Default)]
pub struct FakeBroker {
    shared: Arc<Shared>,
}

impl FakeBroker {
    pub fn new(messages: impl IntoIterator<Item = DeliveredMessage>) -> Self {
        let broker = Self::default();
        broker
            .shared
            .messages
            .lock()
            .unwrap()
            .extend(messages);
        broker
    }

    /// Keep `next` pending once the messages run out instead of ending.
    pub fn hold_open(self) -> Self {
        *self.shared.hold_open.lock().unwrap() = true;
        self
    }

    pub fn failing_settlement(self) -> Self {
        *self.shared.fail_settlement.lock().unwrap() = true;
        self
    }

    pub fn failing_renewal(self) -> Self {
        *self.shared.fail_renewal.lock().unwrap() = true;
        self
    }

    /// Return `err` from `next` before any message.
    pub fn failing_next(self, err: ClientError) -> Self {
        self.shared.next_errors.lock().unwrap().push_back(err);
        self
    }

    pub fn failing_open(self, err: ClientError) -> Self {
        *self.shared.open_error.lock().unwrap() = Some(err);
        self
    }

    pub fn with_error_events(self, events: mpsc::Receiver<TransportError>) -> Self {
        *self.shared.error_events.lock().unwrap() = Some(events);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<(EntityDescriptor, ReceiveOptions)> {
        self.shared.opened.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.shared.calls.lock().unwrap().push(call);
    }

    fn settle(&self, call: Call) -> Result<(), ClientError> {
        self.record(call);
        if *self.shared.fail_settlement.lock().unwrap() {
            return Err(ClientError::LockLost("lease expired".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    type Stream = FakeStream;

    async fn open_receiver(
        &self,
        entity: &EntityDescriptor,
        options: ReceiveOptions,
    ) -> Result<FakeStream, ClientError> {
        let failure = self.shared.open_error.lock().unwrap().take();
        if let Some(err) = failure {
            return Err(err);
        }
        self.shared
            .opened
            .lock()
            .unwrap()
            .push((entity.clone(), options));
        Ok(FakeStream {
            broker: self.clone(),
            closed: false,
        })
    }
}

pub struct FakeStream {
    broker: FakeBroker,
    closed: bool,
}

#[async_trait]
impl ReceiveStream for FakeStream {
    async fn next(&mut self) -> Result<Option<DeliveredMessage>, ClientError> {
        if self.closed {
            return Ok(None);
        }
        let shared = &self.broker.shared;
        let failure = shared.next_errors.lock().unwrap().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        let next = shared.messages.lock().unwrap().pop_front();
        let hold_open = *shared.hold_open.lock().unwrap();
        match next {
            Some(message) => Ok(Some(message)),
            None if hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn acknowledge(&self, message: &DeliveredMessage) -> Result<(), ClientError> {
        self.broker.settle(Call::Acknowledge(message.id.clone()))
    }

    async fn requeue(&self, message: &DeliveredMessage) -> Result<(), ClientError> {
        self.broker.settle(Call::Requeue(message.id.clone()))
    }

    async fn dead_letter(
        &self,
        message: &DeliveredMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ClientError> {
        self.broker.settle(Call::DeadLetter {
            id: message.id.clone(),
            reason: reason.to_string(),
            description: description.to_string(),
        })
    }

    async fn renew_lease(&self, message: &DeliveredMessage) -> Result<DateTime<Utc>, ClientError> {
        self.broker.record(Call::Renew(message.id.clone()));
        if *self.broker.shared.fail_renewal.lock().unwrap() {
            return Err(ClientError::LockLost("lock already released".to_string()));
        }
        Ok(Utc::now() + chrono::Duration::seconds(30))
    }

    fn take_errors(&mut self) -> Option<mpsc::Receiver<TransportError>> {
        self.broker.shared.error_events.lock().unwrap().take()
    }

    async fn close(&mut self) {
        self.closed = true;
        self.broker.record(Call::Close);
    }
}

/// Answers from a list, tracking how many reads are in flight at once.
pub struct TrackingInput {
    answers: VecDeque<String>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl TrackingInput {
    pub fn new(answers: &[&str], active: Arc<AtomicUsize>, max_active: Arc<AtomicUsize>) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            active,
            max_active,
        }
    }
}

#[async_trait]
impl OperatorInput for TrackingInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self.answers.pop_front())
    }
}

/// Input whose reads always fail.
pub struct BrokenInput;

#[async_trait]
impl OperatorInput for BrokenInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Err(io::Error::other("terminal went away"))
    }
}

/// A console writer that rejects every write.
pub struct BrokenWriter;

impl io::Write for BrokenWriter {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn message(id: &str, delivery_count: u32) -> DeliveredMessage {
    let enqueued = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    DeliveredMessage {
        id: id.to_string(),
        lock_token: format!("{id}-token-{delivery_count}"),
        body: format!(r#"{{"content":"hello","messageId":"{id}"}}"#).into_bytes(),
        properties: vec![("Source".to_string(), PropertyValue::from("test"))],
        content_type: Some("application/json".to_string()),
        delivery_count,
        enqueued_at: enqueued,
        locked_until: enqueued + chrono::Duration::seconds(30),
    }
}

pub struct Harness<I> {
    pub processor: SequentialProcessor<FakeBroker, I>,
    pub output: Captured,
    pub cancel: CancellationToken,
}

pub fn harness<I: OperatorInput>(broker: &FakeBroker, input: I) -> Harness<I> {
    harness_with(broker, input, Console::capture(), LeaseRenewal::disabled())
}

pub fn harness_with<I: OperatorInput>(
    broker: &FakeBroker,
    input: I,
    (console, output): (Console, Captured),
    renewal: LeaseRenewal,
) -> Harness<I> {
    let cancel = CancellationToken::new();
    let policy = ResolutionPolicy::new(input, console.clone(), renewal, cancel.clone());
    Harness {
        processor: SequentialProcessor::new(broker.clone(), policy, console, cancel.clone()),
        output,
        cancel,
    }
}

/// Poll captured console output until it contains `needle`.
pub async fn wait_for_output(output: &Captured, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !output.contents().contains(needle) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {needle:?} in:\n{}",
            output.contents()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
