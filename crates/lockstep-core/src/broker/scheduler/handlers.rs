use chrono::{DateTime, Utc};

use super::*;
use crate::broker::command::EntityInfo;
use crate::error::{SendError, SettleError};

impl Scheduler {
    pub(super) fn handle_send(
        &mut self,
        entity: &str,
        mut message: Message,
    ) -> Result<String, SendError> {
        // Paths with segments address sub-queues, which only the broker writes to
        let targets = if entity.contains('/') {
            None
        } else if let Some(subscriptions) = self.topics.get(entity) {
            Some(subscriptions.clone())
        } else if self.queues.contains_key(entity) {
            Some(vec![entity.to_string()])
        } else {
            None
        };
        let targets = targets.ok_or_else(|| SendError::EntityNotFound(entity.to_string()))?;

        if message.id.is_empty() {
            message.id = Message::new_id();
        }
        message.delivery_count = 0;
        message.enqueued_at = Utc::now();
        let msg_id = message.id.clone();

        // A topic without subscriptions accepts and drops the message
        for key in &targets {
            if let Some(state) = self.queues.get_mut(key) {
                state.push_new(message.clone());
            }
        }
        for key in &targets {
            self.deliver_waiting(key);
        }

        debug!(%entity, %msg_id, fan_out = targets.len(), "message accepted");
        Ok(msg_id)
    }

    pub(super) fn handle_check_entity(&self, path: &EntityPath) -> Result<EntityInfo, ReceiveError> {
        let key = path.to_string();
        self.queues
            .get(&key)
            .map(|state| EntityInfo {
                lock_duration_ms: state.config.lock_duration_ms,
            })
            .ok_or(ReceiveError::EntityNotFound(key))
    }

    pub(super) fn handle_receive(&mut self, path: &EntityPath, reply: ReceiveReply) {
        let key = path.to_string();
        let Some(state) = self.queues.get_mut(&key) else {
            let _ = reply.send(Err(ReceiveError::EntityNotFound(key)));
            return;
        };

        state.waiters.push_back(reply);
        self.deliver_waiting(&key);
    }

    pub(super) fn handle_complete(
        &mut self,
        path: &EntityPath,
        lock_token: Uuid,
    ) -> Result<(), SettleError> {
        let (key, message) = self.take_lease(path, lock_token)?;
        debug!(entity = %key, msg_id = %message.id, "message completed");
        Ok(())
    }

    pub(super) fn handle_abandon(
        &mut self,
        path: &EntityPath,
        lock_token: Uuid,
    ) -> Result<(), SettleError> {
        let (key, message) = self.take_lease(path, lock_token)?;
        debug!(
            entity = %key,
            msg_id = %message.id,
            delivery_count = message.delivery_count,
            "message abandoned"
        );

        if let Some(state) = self.queues.get_mut(&key) {
            state.ready.push_front(message);
        }
        self.deliver_waiting(&key);
        Ok(())
    }

    pub(super) fn handle_dead_letter(
        &mut self,
        path: &EntityPath,
        lock_token: Uuid,
        reason: String,
        description: String,
    ) -> Result<(), SettleError> {
        if path.dead_letter {
            return Err(SettleError::NotSupported(format!(
                "cannot dead-letter a message received from {path}"
            )));
        }

        let (key, message) = self.take_lease(path, lock_token)?;
        self.move_to_dead_letter(&key, message, reason, description);
        Ok(())
    }

    pub(super) fn handle_renew_lock(
        &mut self,
        path: &EntityPath,
        lock_token: Uuid,
    ) -> Result<DateTime<Utc>, SettleError> {
        let key = path.to_string();
        let state = self
            .queues
            .get_mut(&key)
            .ok_or_else(|| SettleError::EntityNotFound(key.clone()))?;

        let lock_duration = state.lock_duration();
        let now = Instant::now();
        match state.leases.get_mut(&lock_token) {
            Some(lease) if lease.expires_at > now => {
                lease.expires_at = now + lock_duration;
                debug!(entity = %key, msg_id = %lease.message.id, "lock renewed");
                Ok(locked_until(lock_duration))
            }
            _ => Err(SettleError::LockLost(format!(
                "no active lock {lock_token} on {key}"
            ))),
        }
    }

    /// Remove the lease identified by `lock_token`, returning the queue key
    /// and the message. A lease that expired but was not yet reclaimed is
    /// returned to the queue and reported as lost.
    fn take_lease(
        &mut self,
        path: &EntityPath,
        lock_token: Uuid,
    ) -> Result<(String, Message), SettleError> {
        let key = path.to_string();
        let state = self
            .queues
            .get_mut(&key)
            .ok_or_else(|| SettleError::EntityNotFound(key.clone()))?;

        let lease = state.leases.remove(&lock_token).ok_or_else(|| {
            SettleError::LockLost(format!("no lock {lock_token} on {key}"))
        })?;

        if lease.expires_at <= Instant::now() {
            state.ready.push_front(lease.message);
            self.deliver_waiting(&key);
            return Err(SettleError::LockLost(format!(
                "lock {lock_token} on {key} expired"
            )));
        }

        Ok((key, lease.message))
    }
}

/// Wall-clock time at which a lock taken now for `lock_duration` expires.
pub(super) fn locked_until(lock_duration: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(lock_duration.as_millis()).unwrap_or(i64::MAX);
    Utc::now() + chrono::Duration::milliseconds(millis)
}
