//! Per-user guard allowing one mutating upstream action at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the lifetime of one reserve / cancel / sign-in call.
pub struct FlightPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Keyed lock map. `try_acquire` rejects a second caller immediately;
/// `acquire` queues it behind the first.
#[derive(Default, Clone)]
pub struct SingleFlight {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// `None` when another action for `key` is in flight.
    pub fn try_acquire(&self, key: &str) -> Option<FlightPermit> {
        self.slot(key)
            .try_lock_owned()
            .ok()
            .map(|g| FlightPermit { _guard: g })
    }

    /// Wait for any in-flight action for `key` to finish.
    pub async fn acquire(&self, key: &str) -> FlightPermit {
        FlightPermit {
            _guard: self.slot(key).lock_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_try_is_rejected_until_release() {
        let f = SingleFlight::new();
        let p = f.try_acquire("alice").unwrap();
        assert!(f.try_acquire("alice").is_none());
        assert!(f.try_acquire("bob").is_some());
        drop(p);
        assert!(f.try_acquire("alice").is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let f = SingleFlight::new();
        let p = f.try_acquire("alice").unwrap();
        let f2 = f.clone();
        let waiter = tokio::spawn(async move {
            let _p = f2.acquire("alice").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(p);
        waiter.await.unwrap();
        assert!(f.try_acquire("alice").is_some());
    }
}
