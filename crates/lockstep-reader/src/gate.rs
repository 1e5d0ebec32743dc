use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Single-slot admission for processing cycles.
///
/// A cycle holds the [`GatePermit`] from delivery until its resolution is
/// recorded; dropping the permit releases the slot on every exit path.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    slot: Arc<Mutex<()>>,
}

#[derive(Debug)]
pub struct GatePermit {
    _guard: OwnedMutexGuard<()>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the slot.
    pub async fn acquire(&self) -> GatePermit {
        GatePermit {
            _guard: Arc::clone(&self.slot).lock_owned().await,
        }
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.slot)
            .try_lock_owned()
            .ok()
            .map(|guard| GatePermit { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn second_cycle_waits_for_the_first() {
        let gate = AdmissionGate::new();
        let first = gate.acquire().await;
        assert!(gate.is_held());
        assert!(gate.try_acquire().is_none());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn permit_is_released_when_a_cycle_panics() {
        let gate = AdmissionGate::new();
        let task = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
                panic!("resolution blew up");
            })
        };
        assert!(task.await.is_err());
        assert!(gate.try_acquire().is_some());
    }
}
