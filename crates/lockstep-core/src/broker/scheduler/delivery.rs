use std::cmp::Reverse;

use tracing::warn;

use super::handlers::locked_until;
use super::*;
use crate::message::{DEAD_LETTER_DESCRIPTION, DEAD_LETTER_REASON, MAX_DELIVERY_COUNT_EXCEEDED};

impl Scheduler {
    /// Hand ready messages to parked receive calls until one side runs out.
    pub(super) fn deliver_waiting(&mut self, key: &str) {
        loop {
            let Some(state) = self.queues.get_mut(key) else {
                return;
            };

            // Drop receivers that gave up waiting
            while state.waiters.front().is_some_and(|w| w.is_closed()) {
                state.waiters.pop_front();
            }
            if state.waiters.is_empty() {
                return;
            }

            let Some(locked) = self.lease_next(key) else {
                return;
            };

            let Some(waiter) = self
                .queues
                .get_mut(key)
                .and_then(|state| state.waiters.pop_front())
            else {
                self.release_unseen(key, locked);
                return;
            };

            if let Err(Ok(locked)) = waiter.send(Ok(locked)) {
                // Receiver went away between the check and the send
                self.release_unseen(key, locked);
            }
        }
    }

    /// Lease the next deliverable message, dead-lettering any that have
    /// exhausted their delivery attempts on the way.
    pub(super) fn lease_next(&mut self, key: &str) -> Option<LockedMessage> {
        loop {
            let state = self.queues.get_mut(key)?;
            let mut message = state.ready.pop_front()?;

            if state.dead_letter_key.is_some()
                && message.delivery_count >= state.config.max_delivery_count
            {
                let description = format!(
                    "Message could not be consumed after {} delivery attempts.",
                    message.delivery_count
                );
                self.move_to_dead_letter(
                    key,
                    message,
                    MAX_DELIVERY_COUNT_EXCEEDED.to_string(),
                    description,
                );
                continue;
            }

            message.delivery_count += 1;
            let lock_duration = state.lock_duration();
            let lock_token = Uuid::new_v4();
            state.leases.insert(
                lock_token,
                Lease {
                    message: message.clone(),
                    expires_at: Instant::now() + lock_duration,
                },
            );

            debug!(
                entity = %key,
                msg_id = %message.id,
                delivery_count = message.delivery_count,
                "message leased"
            );

            return Some(LockedMessage {
                message,
                lock_token,
                locked_until: locked_until(lock_duration),
            });
        }
    }

    /// Undo a lease whose message never reached a consumer.
    fn release_unseen(&mut self, key: &str, locked: LockedMessage) {
        let Some(state) = self.queues.get_mut(key) else {
            return;
        };
        if let Some(lease) = state.leases.remove(&locked.lock_token) {
            let mut message = lease.message;
            message.delivery_count = message.delivery_count.saturating_sub(1);
            state.ready.push_front(message);
        }
    }

    /// Move a message into the dead-letter sub-queue of `key`, recording why.
    pub(super) fn move_to_dead_letter(
        &mut self,
        key: &str,
        mut message: Message,
        reason: String,
        description: String,
    ) {
        let Some(dlq_key) = self
            .queues
            .get(key)
            .and_then(|state| state.dead_letter_key.clone())
        else {
            warn!(entity = %key, msg_id = %message.id, "entity has no dead-letter queue, dropping message");
            return;
        };

        message
            .properties
            .retain(|(k, _)| k != DEAD_LETTER_REASON && k != DEAD_LETTER_DESCRIPTION);
        message
            .properties
            .push((DEAD_LETTER_REASON.to_string(), reason.clone().into()));
        message
            .properties
            .push((DEAD_LETTER_DESCRIPTION.to_string(), description.into()));

        info!(entity = %key, msg_id = %message.id, %reason, "message dead-lettered");

        if let Some(dlq) = self.queues.get_mut(&dlq_key) {
            dlq.push_new(message);
        }
        self.deliver_waiting(&dlq_key);
    }

    /// Return every expired lease to the front of its queue, oldest first.
    /// Returns the number of messages reclaimed.
    pub(super) fn reclaim_expired_leases(&mut self) -> usize {
        let now = Instant::now();
        let mut touched = Vec::new();
        let mut reclaimed = 0;

        for (key, state) in self.queues.iter_mut() {
            let expired: Vec<Uuid> = state
                .leases
                .iter()
                .filter(|(_, lease)| lease.expires_at <= now)
                .map(|(token, _)| *token)
                .collect();
            if expired.is_empty() {
                continue;
            }

            let mut messages: Vec<Message> = expired
                .iter()
                .filter_map(|token| state.leases.remove(token))
                .map(|lease| lease.message)
                .collect();
            messages.sort_by_key(|m| Reverse(m.sequence_number));

            reclaimed += messages.len();
            for message in messages {
                debug!(entity = %key, msg_id = %message.id, "lease expired, message requeued");
                state.ready.push_front(message);
            }
            touched.push(key.clone());
        }

        for key in touched {
            self.deliver_waiting(&key);
        }
        reclaimed
    }
}
