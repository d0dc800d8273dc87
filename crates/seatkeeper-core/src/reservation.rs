//! Tracks the user's single active reservation as last reported upstream.

use crate::booking::BookingError;
use crate::types::{Reservation, ReservationState, VenueId};
use crate::upstream::Upstream;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
pub struct ReservationTracker {
    current: RwLock<Option<Reservation>>,
}

impl ReservationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-query the upstream and replace the tracked reservation.
    ///
    /// Records that are inactive, keyless or dated before `today` are treated
    /// as no reservation. On failure the previous value is kept.
    pub async fn refresh(
        &self,
        upstream: &dyn Upstream,
        today: NaiveDate,
    ) -> Result<Option<Reservation>, BookingError> {
        let fetched = upstream
            .current_reservation()
            .await
            .map_err(|e| BookingError::from_upstream(&e))?;
        let next = fetched.filter(|r| is_live(r, today));

        let mut guard = self.current.write().await;
        let before = state_of(guard.as_ref());
        let after = state_of(next.as_ref());
        if before != after {
            info!(from = %before, to = %after, "reservation state changed");
        } else {
            debug!(state = %after, "reservation refreshed");
        }
        *guard = next.clone();
        Ok(next)
    }

    pub async fn current(&self) -> Option<Reservation> {
        self.current.read().await.clone()
    }

    pub async fn state(&self) -> ReservationState {
        state_of(self.current.read().await.as_ref())
    }

    /// Whether the tracked reservation is for exactly this seat.
    pub async fn is_mine(&self, venue_id: VenueId, seat_key: &str) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|r| r.venue_id == venue_id && r.seat_key == seat_key)
    }

    /// Drop the tracked reservation without asking upstream.
    pub async fn clear(&self) {
        let mut guard = self.current.write().await;
        if let Some(prev) = guard.take() {
            info!(from = %prev.state(), to = %ReservationState::None, "reservation cleared");
        }
    }
}

fn state_of(r: Option<&Reservation>) -> ReservationState {
    r.map(Reservation::state).unwrap_or(ReservationState::None)
}

fn is_live(r: &Reservation, today: NaiveDate) -> bool {
    if !r.state().is_active() || r.seat_key.trim().is_empty() {
        return false;
    }
    r.date.map_or(true, |d| d >= today)
}
