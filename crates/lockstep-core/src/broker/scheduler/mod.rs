use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::command::{LockedMessage, SchedulerCommand};
use crate::broker::config::BrokerConfig;
use crate::entity::{EntityPath, QueueConfig};
use crate::error::ReceiveError;
use crate::message::Message;

mod delivery;
mod handlers;

type ReceiveReply = tokio::sync::oneshot::Sender<Result<LockedMessage, ReceiveError>>;

/// A message currently locked to a consumer.
pub(super) struct Lease {
    pub(super) message: Message,
    pub(super) expires_at: Instant,
}

/// All state of one receivable queue (a queue, a topic subscription, or the
/// dead-letter sub-queue of either).
pub(super) struct QueueState {
    pub(super) config: QueueConfig,
    /// Messages available for delivery, in delivery order.
    pub(super) ready: VecDeque<Message>,
    /// In-flight messages keyed by lock token.
    pub(super) leases: HashMap<Uuid, Lease>,
    /// Receive calls parked until a message becomes available, FIFO.
    pub(super) waiters: VecDeque<ReceiveReply>,
    next_sequence: u64,
    /// Key of the dead-letter sub-queue; `None` for a dead-letter queue itself.
    pub(super) dead_letter_key: Option<String>,
}

impl QueueState {
    fn new(config: QueueConfig, dead_letter_key: Option<String>) -> Self {
        Self {
            config,
            ready: VecDeque::new(),
            leases: HashMap::new(),
            waiters: VecDeque::new(),
            next_sequence: 1,
            dead_letter_key,
        }
    }

    /// Append a newly arrived message, stamping its sequence number.
    pub(super) fn push_new(&mut self, mut message: Message) {
        message.sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.ready.push_back(message);
    }

    pub(super) fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.config.lock_duration_ms)
    }
}

/// Single-threaded scheduler core. Owns all queue state and processes
/// commands from IO tasks via a crossbeam channel.
pub struct Scheduler {
    inbound: Receiver<SchedulerCommand>,
    idle_timeout: Duration,
    running: bool,
    /// Receivable queues keyed by their entity path string.
    queues: HashMap<String, QueueState>,
    /// Topic name to the keys of its subscription queues.
    topics: HashMap<String, Vec<String>>,
}

impl Scheduler {
    pub fn new(inbound: Receiver<SchedulerCommand>, config: &BrokerConfig) -> Self {
        let mut scheduler = Self {
            inbound,
            idle_timeout: Duration::from_millis(config.scheduler.idle_timeout_ms),
            running: true,
            queues: HashMap::new(),
            topics: HashMap::new(),
        };

        for queue in &config.queues {
            scheduler.register(EntityPath::queue(&queue.name), queue.clone());
        }

        for topic in &config.topics {
            let mut keys = Vec::with_capacity(topic.subscriptions.len());
            for subscription in &topic.subscriptions {
                let path = EntityPath::subscription(&topic.name, &subscription.name);
                keys.push(path.to_string());
                scheduler.register(path, subscription.clone());
            }
            scheduler.topics.insert(topic.name.clone(), keys);
        }

        scheduler
    }

    /// Create the state for an entity and its dead-letter sub-queue.
    fn register(&mut self, path: EntityPath, config: QueueConfig) {
        let dlq_path = path.dead_letter_queue();
        let key = path.to_string();
        let dlq_key = dlq_path.to_string();

        self.queues
            .insert(dlq_key.clone(), QueueState::new(config.clone(), None));
        self.queues
            .insert(key.clone(), QueueState::new(config, Some(dlq_key)));
        debug!(entity = %key, "entity registered");
    }

    /// Run the scheduler event loop. This blocks the current thread until
    /// a `Shutdown` command is received or the inbound channel is disconnected.
    pub fn run(&mut self) {
        info!(entities = self.queues.len(), "scheduler started");
        self.running = true;

        while self.running {
            // Phase 1: return expired leases to their queues
            self.reclaim_expired_leases();

            // Phase 2: drain all buffered commands (non-blocking)
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd);
                drained += 1;
                if !self.running {
                    break;
                }
            }

            if !self.running {
                break;
            }

            // Phase 3: park until next command or timeout
            if drained == 0 {
                match self.inbound.recv_timeout(self.idle_timeout) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        info!("inbound channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        // Parked receive calls observe their reply channel closing
        for state in self.queues.values_mut() {
            state.waiters.clear();
        }

        info!("scheduler stopped");
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Send {
                entity,
                message,
                reply,
            } => {
                debug!(%entity, msg_id = %message.id, "send command received");
                let result = self.handle_send(&entity, message);
                let _ = reply.send(result);
            }
            SchedulerCommand::CheckEntity { path, reply } => {
                let result = self.handle_check_entity(&path);
                let _ = reply.send(result);
            }
            SchedulerCommand::Receive { path, reply } => {
                debug!(%path, "receive command received");
                self.handle_receive(&path, reply);
            }
            SchedulerCommand::Complete {
                path,
                lock_token,
                reply,
            } => {
                debug!(%path, %lock_token, "complete command received");
                let result = self.handle_complete(&path, lock_token);
                let _ = reply.send(result);
            }
            SchedulerCommand::Abandon {
                path,
                lock_token,
                reply,
            } => {
                debug!(%path, %lock_token, "abandon command received");
                let result = self.handle_abandon(&path, lock_token);
                let _ = reply.send(result);
            }
            SchedulerCommand::DeadLetter {
                path,
                lock_token,
                reason,
                description,
                reply,
            } => {
                debug!(%path, %lock_token, %reason, "dead-letter command received");
                let result = self.handle_dead_letter(&path, lock_token, reason, description);
                let _ = reply.send(result);
            }
            SchedulerCommand::RenewLock {
                path,
                lock_token,
                reply,
            } => {
                debug!(%path, %lock_token, "renew lock command received");
                let result = self.handle_renew_lock(&path, lock_token);
                let _ = reply.send(result);
            }
            SchedulerCommand::Shutdown => {
                info!("shutdown command received");
                self.running = false;
            }
        }
    }

    /// Ready and leased message counts of an entity (used by tests).
    #[cfg(test)]
    pub fn depth(&self, path: &EntityPath) -> (usize, usize) {
        self.queues
            .get(&path.to_string())
            .map(|state| (state.ready.len(), state.leases.len()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests;
