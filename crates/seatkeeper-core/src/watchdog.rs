//! Delayed auto-sign-in when a reservation is flagged as supervised.
//!
//! `Idle → Armed → Fired → Idle`. At most one timer is pending at any moment.

use crate::types::ReservationState;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogPhase {
    Idle,
    Armed,
    Fired,
}

struct Inner {
    phase: WatchdogPhase,
    timer: Option<AbortHandle>,
    /// Bumped on every arm so a stale timer can tell it was superseded.
    generation: u64,
    closed: bool,
}

#[derive(Clone)]
pub struct Watchdog {
    delay: Duration,
    enabled: bool,
    shared: Arc<Mutex<Inner>>,
}

impl Watchdog {
    pub fn new(delay: Duration, enabled: bool) -> Self {
        Self {
            delay,
            enabled,
            shared: Arc::new(Mutex::new(Inner {
                phase: WatchdogPhase::Idle,
                timer: None,
                generation: 0,
                closed: false,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, false)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.lock().phase
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared)
    }

    /// Feed one tracker observation.
    ///
    /// `fire` is invoked at most once, after the delay, if the timer was armed
    /// by this call and not cancelled in the meantime.
    pub fn observe<F, Fut>(&self, state: ReservationState, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.enabled {
            return;
        }
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        let supervised = state == ReservationState::Supervised;
        match (inner.phase, supervised) {
            (WatchdogPhase::Idle, true) => {
                inner.generation += 1;
                let generation = inner.generation;
                inner.phase = WatchdogPhase::Armed;
                let shared = self.shared.clone();
                let delay = self.delay;
                info!(delay_secs = delay.as_secs(), "supervised; auto sign-in armed");
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    {
                        let mut g = lock(&shared);
                        if g.generation != generation || g.phase != WatchdogPhase::Armed {
                            return;
                        }
                        g.phase = WatchdogPhase::Fired;
                        g.timer = None;
                    }
                    info!("auto sign-in firing");
                    fire().await;
                    let mut g = lock(&shared);
                    if g.generation == generation && g.phase == WatchdogPhase::Fired {
                        g.phase = WatchdogPhase::Idle;
                    }
                });
                inner.timer = Some(handle.abort_handle());
            }
            (WatchdogPhase::Armed, false) => {
                if let Some(t) = inner.timer.take() {
                    t.abort();
                }
                inner.phase = WatchdogPhase::Idle;
                info!(state = %state, "supervision cleared; auto sign-in cancelled");
            }
            (phase, _) => {
                debug!(?phase, state = %state, "watchdog unchanged");
            }
        }
    }

    /// Cancel any pending timer and refuse to arm again.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        if let Some(t) = inner.timer.take() {
            t.abort();
            debug!("pending auto sign-in torn down");
        }
        inner.phase = WatchdogPhase::Idle;
    }
}

fn lock(m: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn feed(w: &Watchdog, state: ReservationState, fired: &Arc<AtomicUsize>) {
        let fired = fired.clone();
        w.observe(state, move || async move {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_supervised_arms_once() {
        let w = Watchdog::new(Duration::from_secs(300), true);
        let fired = counter();
        feed(&w, ReservationState::Supervised, &fired);
        settle().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        feed(&w, ReservationState::Supervised, &fired);
        assert_eq!(w.phase(), WatchdogPhase::Armed);

        tokio::time::advance(Duration::from_secs(291)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(w.phase(), WatchdogPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_before_delay_cancels() {
        let w = Watchdog::new(Duration::from_secs(300), true);
        let fired = counter();
        feed(&w, ReservationState::Supervised, &fired);
        feed(&w, ReservationState::Supervised, &fired);
        tokio::time::advance(Duration::from_secs(60)).await;
        feed(&w, ReservationState::CheckedIn, &fired);
        assert_eq!(w.phase(), WatchdogPhase::Idle);

        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_after_firing() {
        let w = Watchdog::new(Duration::from_secs(3), true);
        let fired = counter();
        feed(&w, ReservationState::Supervised, &fired);
        settle().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        feed(&w, ReservationState::Supervised, &fired);
        assert_eq!(w.phase(), WatchdogPhase::Armed);
        settle().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_tears_down_pending_timer() {
        let w = Watchdog::new(Duration::from_secs(300), true);
        let fired = counter();
        feed(&w, ReservationState::Supervised, &fired);
        w.shutdown();
        feed(&w, ReservationState::Supervised, &fired);
        assert_eq!(w.phase(), WatchdogPhase::Idle);
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_never_arms() {
        let w = Watchdog::disabled();
        let fired = counter();
        feed(&w, ReservationState::Supervised, &fired);
        assert_eq!(w.phase(), WatchdogPhase::Idle);
    }
}
