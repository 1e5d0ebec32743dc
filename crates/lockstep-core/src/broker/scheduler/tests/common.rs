use super::*;
use crossbeam_channel::Sender;
use tokio::sync::oneshot;

pub(super) type Reply<T> = oneshot::Receiver<T>;

/// Queues used across the scheduler tests:
/// - `orders`: 30s lock, three deliveries before dead-lettering
/// - `short`: 200ms lock
/// - `events`: topic with `audit` and `billing` subscriptions
pub(super) fn test_config() -> BrokerConfig {
    BrokerConfig {
        scheduler: SchedulerConfig {
            command_channel_capacity: 256,
            idle_timeout_ms: 10,
        },
        queues: vec![
            QueueConfig::new("orders").with_max_delivery_count(3),
            QueueConfig::new("short").with_lock_duration_ms(200),
        ],
        topics: vec![TopicConfig::new("events")
            .with_subscription(QueueConfig::new("audit"))
            .with_subscription(QueueConfig::new("billing"))],
        ..Default::default()
    }
}

pub(super) fn test_setup() -> (Sender<SchedulerCommand>, Scheduler) {
    let config = test_config();
    let (tx, rx) = crossbeam_channel::bounded(config.scheduler.command_channel_capacity);
    let scheduler = Scheduler::new(rx, &config);
    (tx, scheduler)
}

/// Queue a shutdown behind everything already sent and run the scheduler
/// until it processes it.
pub(super) fn run_until_idle(tx: &Sender<SchedulerCommand>, scheduler: &mut Scheduler) {
    tx.send(SchedulerCommand::Shutdown).unwrap();
    scheduler.run();
}

pub(super) fn send(
    tx: &Sender<SchedulerCommand>,
    entity: &str,
    id: &str,
) -> Reply<Result<String, SendError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::Send {
        entity: entity.to_string(),
        message: Message::new(id, format!("{{\"id\":\"{id}\"}}").into_bytes()),
        reply,
    })
    .unwrap();
    rx
}

pub(super) fn receive(
    tx: &Sender<SchedulerCommand>,
    path: &EntityPath,
) -> Reply<Result<LockedMessage, ReceiveError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::Receive {
        path: path.clone(),
        reply,
    })
    .unwrap();
    rx
}

pub(super) fn complete(
    tx: &Sender<SchedulerCommand>,
    path: &EntityPath,
    lock_token: Uuid,
) -> Reply<Result<(), SettleError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::Complete {
        path: path.clone(),
        lock_token,
        reply,
    })
    .unwrap();
    rx
}

pub(super) fn abandon(
    tx: &Sender<SchedulerCommand>,
    path: &EntityPath,
    lock_token: Uuid,
) -> Reply<Result<(), SettleError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::Abandon {
        path: path.clone(),
        lock_token,
        reply,
    })
    .unwrap();
    rx
}

pub(super) fn dead_letter(
    tx: &Sender<SchedulerCommand>,
    path: &EntityPath,
    lock_token: Uuid,
    reason: &str,
    description: &str,
) -> Reply<Result<(), SettleError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::DeadLetter {
        path: path.clone(),
        lock_token,
        reason: reason.to_string(),
        description: description.to_string(),
        reply,
    })
    .unwrap();
    rx
}

pub(super) fn renew(
    tx: &Sender<SchedulerCommand>,
    path: &EntityPath,
    lock_token: Uuid,
) -> Reply<Result<chrono::DateTime<chrono::Utc>, SettleError>> {
    let (reply, rx) = oneshot::channel();
    tx.send(SchedulerCommand::RenewLock {
        path: path.clone(),
        lock_token,
        reply,
    })
    .unwrap();
    rx
}

/// Receive one message from `path`, running the scheduler to completion.
pub(super) fn receive_now(
    tx: &Sender<SchedulerCommand>,
    scheduler: &mut Scheduler,
    path: &EntityPath,
) -> LockedMessage {
    let mut rx = receive(tx, path);
    run_until_idle(tx, scheduler);
    rx.try_recv()
        .expect("receive should have been answered")
        .expect("receive should succeed")
}
