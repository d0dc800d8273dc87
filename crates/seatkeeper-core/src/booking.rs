//! Per-user booking orchestration.
//!
//! Every mutating call first takes the user's single-flight guard, then is
//! checked locally (tracked reservation, venue hours, last-known seat status)
//! before reaching the upstream. Interactive callers fail fast when the guard
//! is held and check against cached data. Scheduled work queues behind the
//! guard and re-reads the reservation and seat map once it holds it.

use crate::classifier::{classify_upstream, ErrorKind};
use crate::clock::Clock;
use crate::flight::{FlightPermit, SingleFlight};
use crate::layout::{Layout, VenueCache};
use crate::reservation::ReservationTracker;
use crate::types::{FrequentSeat, Reservation, ReservationState, Venue, VenueId};
use crate::upstream::{Upstream, UpstreamError};
use crate::watchdog::Watchdog;
use crate::window;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// BookingError
// ---------------------------------------------------------------------------

/// A classified failure from one orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BookingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BookingError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_upstream(err: &UpstreamError) -> Self {
        let c = classify_upstream(err);
        Self {
            kind: c.kind,
            message: c.message,
        }
    }
}

// ---------------------------------------------------------------------------
// BookingResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingResult {
    pub venue_id: VenueId,
    pub seat_key: String,
    pub seat_name: String,
    /// The tracked reservation after the post-booking refresh.
    pub reservation: Option<Reservation>,
    /// True when the upstream reported a conflict but the follow-up refresh
    /// showed the seat as ours.
    pub confirmed_by_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    FailFast,
    Queue,
}

// ---------------------------------------------------------------------------
// BookingOrchestrator
// ---------------------------------------------------------------------------

pub struct BookingOrchestrator {
    user: String,
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    cache: VenueCache,
    tracker: ReservationTracker,
    flight: SingleFlight,
    watchdog: Watchdog,
}

impl BookingOrchestrator {
    pub fn new(
        user: impl Into<String>,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
        flight: SingleFlight,
        watchdog: Watchdog,
    ) -> Arc<Self> {
        Arc::new(Self {
            user: user.into(),
            upstream,
            clock,
            cache: VenueCache::new(),
            tracker: ReservationTracker::new(),
            flight,
            watchdog,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn cache(&self) -> &VenueCache {
        &self.cache
    }

    pub fn tracker(&self) -> &ReservationTracker {
        &self.tracker
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    // -- reads ------------------------------------------------------------

    pub async fn list_venues(&self) -> Result<Vec<Venue>, BookingError> {
        self.cache.list_venues(self.upstream()).await
    }

    /// Fetch a fresh layout for `venue_id`, replacing the cached snapshot.
    pub async fn layout(&self, venue_id: VenueId) -> Result<Layout, BookingError> {
        self.cache.get_layout(self.upstream(), venue_id).await
    }

    pub async fn frequent_seats(&self) -> Result<Vec<FrequentSeat>, BookingError> {
        self.upstream()
            .frequent_seats()
            .await
            .map_err(|e| BookingError::from_upstream(&e))
    }

    /// Re-query the reservation and feed the result to the watchdog.
    pub async fn refresh_reservation(self: &Arc<Self>) -> Result<Option<Reservation>, BookingError> {
        let current = self
            .tracker
            .refresh(self.upstream(), self.clock.today())
            .await?;
        self.observe_state(current.as_ref().map_or(ReservationState::None, Reservation::state));
        Ok(current)
    }

    /// Refresh, falling back to the last known value on failure.
    async fn refresh_or_keep(self: &Arc<Self>) -> Option<Reservation> {
        match self.refresh_reservation().await {
            Ok(r) => r,
            Err(e) => {
                warn!(user = %self.user, kind = ?e.kind, "reservation refresh failed: {e}");
                self.tracker.current().await
            }
        }
    }

    fn observe_state(self: &Arc<Self>, state: ReservationState) {
        let this = Arc::clone(self);
        self.watchdog.observe(state, move || this.auto_sign_in());
    }

    async fn auto_sign_in(self: Arc<Self>) {
        match self.sign_in_with(Wait::Queue).await {
            Ok(msg) => info!(user = %self.user, "auto sign-in succeeded: {msg}"),
            Err(e) => warn!(user = %self.user, kind = ?e.kind, "auto sign-in failed: {e}"),
        }
    }

    // -- predicates -------------------------------------------------------

    /// Venue open now, seat last seen available, and no reservation held.
    /// Answers from cached data only.
    pub async fn can_book(&self, venue_id: VenueId, seat_key: &str) -> bool {
        let Some(venue) = self.cache.venue(venue_id).await else {
            return false;
        };
        if !window::is_open(&venue, self.clock.time_of_day()) {
            return false;
        }
        let available = self
            .cache
            .find_seat(venue_id, seat_key)
            .await
            .is_some_and(|s| s.is_available());
        available && !self.tracker.state().await.is_active()
    }

    pub async fn is_mine(&self, venue_id: VenueId, seat_key: &str) -> bool {
        self.tracker.is_mine(venue_id, seat_key).await
    }

    // -- guard ------------------------------------------------------------

    async fn permit(&self, wait: Wait) -> Result<FlightPermit, BookingError> {
        match wait {
            Wait::FailFast => self.flight.try_acquire(&self.user).ok_or_else(|| {
                debug!(user = %self.user, "rejected: action already in flight");
                BookingError::new(ErrorKind::AlreadyInFlight)
            }),
            Wait::Queue => Ok(self.flight.acquire(&self.user).await),
        }
    }

    // -- book -------------------------------------------------------------

    /// Reserve a seat. Rejects immediately if another action is in flight.
    pub async fn book(
        self: &Arc<Self>,
        venue_id: VenueId,
        seat_key: &str,
    ) -> Result<BookingResult, BookingError> {
        self.book_with(venue_id, seat_key, Wait::FailFast).await
    }

    /// Reserve a seat, waiting for any in-flight action to finish first.
    pub async fn book_queued(
        self: &Arc<Self>,
        venue_id: VenueId,
        seat_key: &str,
    ) -> Result<BookingResult, BookingError> {
        self.book_with(venue_id, seat_key, Wait::Queue).await
    }

    async fn book_with(
        self: &Arc<Self>,
        venue_id: VenueId,
        seat_key: &str,
        wait: Wait,
    ) -> Result<BookingResult, BookingError> {
        let _permit = self.permit(wait).await?;
        // Queued callers re-read whatever may have changed while waiting.
        let fresh = wait == Wait::Queue;
        if fresh {
            self.refresh_reservation().await?;
        }
        if let Some(held) = self.tracker.current().await {
            debug!(user = %self.user, venue_id, seat_key, "rejected: reservation already held");
            return Err(BookingError::with_message(
                ErrorKind::SeatUnavailable,
                format!(
                    "already holding seat {} at venue {}",
                    held.seat_key, held.venue_id
                ),
            ));
        }

        let venue = self
            .cache
            .venue_or_fetch(self.upstream(), venue_id)
            .await?
            .ok_or_else(|| {
                BookingError::with_message(
                    ErrorKind::VenueClosed,
                    format!("venue {venue_id} is not listed"),
                )
            })?;
        if !window::is_open(&venue, self.clock.time_of_day()) {
            debug!(user = %self.user, venue_id, "rejected: venue closed");
            return Err(BookingError::new(ErrorKind::VenueClosed));
        }

        if fresh || self.cache.snapshot(venue_id).await.is_none() {
            self.cache.get_layout(self.upstream(), venue_id).await?;
        }
        let seat = match self.cache.find_seat(venue_id, seat_key).await {
            Some(s) if s.is_available() => s,
            other => {
                debug!(user = %self.user, venue_id, seat_key, found = other.is_some(), "rejected: seat unavailable");
                return Err(BookingError::new(ErrorKind::SeatUnavailable));
            }
        };

        info!(user = %self.user, venue_id, seat_key, "submitting reservation");
        let outcome = self.upstream().reserve(venue_id, seat_key).await;

        match outcome {
            Ok(()) => {
                let reservation = self.refresh_or_keep().await;
                info!(user = %self.user, venue_id, seat_key, "reservation accepted");
                Ok(BookingResult {
                    venue_id,
                    seat_key: seat_key.to_string(),
                    seat_name: seat.name,
                    reservation,
                    confirmed_by_refresh: false,
                })
            }
            Err(e) => {
                let err = BookingError::from_upstream(&e);
                warn!(user = %self.user, venue_id, seat_key, kind = ?err.kind, "reservation rejected: {err}");
                match err.kind {
                    ErrorKind::RateLimitedOrBanned => {
                        self.refresh_or_keep().await;
                    }
                    ErrorKind::SeatConflict => {
                        let reservation = self.refresh_or_keep().await;
                        if self.tracker.is_mine(venue_id, seat_key).await {
                            info!(user = %self.user, venue_id, seat_key, "conflict resolved: seat is ours");
                            return Ok(BookingResult {
                                venue_id,
                                seat_key: seat_key.to_string(),
                                seat_name: seat.name,
                                reservation,
                                confirmed_by_refresh: true,
                            });
                        }
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    // -- cancel -----------------------------------------------------------

    pub async fn cancel(self: &Arc<Self>) -> Result<(), BookingError> {
        let _permit = self.permit(Wait::FailFast).await?;
        info!(user = %self.user, "cancelling reservation");
        match self.upstream().cancel_reservation().await {
            Ok(()) => {
                self.tracker.clear().await;
                self.observe_state(ReservationState::None);
                Ok(())
            }
            Err(e) => {
                let err = BookingError::from_upstream(&e);
                warn!(user = %self.user, kind = ?err.kind, "cancel rejected: {err}");
                if err.kind == ErrorKind::RateLimitedOrBanned {
                    self.refresh_or_keep().await;
                }
                Err(err)
            }
        }
    }

    // -- sign in ----------------------------------------------------------

    /// Sign in to the tracked reservation. Rejects if another action is in
    /// flight.
    pub async fn sign_in(self: &Arc<Self>) -> Result<String, BookingError> {
        let result = self.sign_in_with(Wait::FailFast).await;
        self.observe_state(self.tracker.state().await);
        result
    }

    /// Sign in, waiting for any in-flight action to finish first.
    pub async fn sign_in_queued(self: &Arc<Self>) -> Result<String, BookingError> {
        let result = self.sign_in_with(Wait::Queue).await;
        self.observe_state(self.tracker.state().await);
        result
    }

    /// Never feeds the watchdog, so the watchdog's own firing can use it.
    async fn sign_in_with(&self, wait: Wait) -> Result<String, BookingError> {
        if !self.tracker.state().await.is_active() {
            return Err(BookingError::new(ErrorKind::NoActiveReservation));
        }
        let _permit = self.permit(wait).await?;
        info!(user = %self.user, "signing in");
        let outcome = self.upstream().sign_in().await;
        let refreshed = self.tracker.refresh(self.upstream(), self.clock.today()).await;
        if let Err(e) = &refreshed {
            warn!(user = %self.user, kind = ?e.kind, "reservation refresh after sign-in failed: {e}");
        }
        match outcome {
            Ok(msg) => {
                info!(user = %self.user, "sign-in accepted: {msg}");
                Ok(msg)
            }
            Err(e) => {
                let err = BookingError::from_upstream(&e);
                warn!(user = %self.user, kind = ?err.kind, "sign-in rejected: {err}");
                Err(err)
            }
        }
    }

    /// Tear down any pending watchdog timer.
    pub fn shutdown(&self) {
        self.watchdog.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::testing::FakeUpstream;
    use crate::watchdog::WatchdogPhase;
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;
    use std::time::Duration;

    fn clock_at(hh: u32, mm: u32) -> Arc<FixedClock> {
        Arc::new(FixedClock::at(
            NaiveDate::from_ymd_opt(2026, 4, 10).unwrap(),
            NaiveTime::from_hms_opt(hh, mm, 0).unwrap(),
        ))
    }

    fn seats_layout() -> serde_json::Value {
        json!({"seats": [
            {"key": "a", "name": "A-1", "rawStatus": 1},
            {"key": "b", "name": "B-1", "rawStatus": 3},
        ]})
    }

    fn setup(up: &Arc<FakeUpstream>, watchdog: Watchdog) -> Arc<BookingOrchestrator> {
        up.set_layout(1, seats_layout());
        BookingOrchestrator::new(
            "alice",
            up.clone(),
            clock_at(10, 0),
            SingleFlight::new(),
            watchdog,
        )
    }

    fn reserved(key: &str, status: i64) -> Reservation {
        Reservation {
            venue_id: 1,
            seat_key: key.into(),
            status,
            selection_status: None,
            seat_name: None,
            date: None,
        }
    }

    fn open_venue() -> Venue {
        FakeUpstream::venue(1, Some("08:00"), Some("22:00"))
    }

    #[tokio::test]
    async fn book_success_refreshes_tracker() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.on_reserve_set_reservation(reserved("a", 1));
        let o = setup(&up, Watchdog::disabled());
        let r = o.book(1, "a").await.unwrap();
        assert_eq!(r.seat_name, "A-1");
        assert!(!r.confirmed_by_refresh);
        assert!(o.is_mine(1, "a").await);
        assert_eq!(up.calls("reserve"), 1);
        assert_eq!(up.calls("current_reservation"), 1);
    }

    #[tokio::test]
    async fn closed_venue_never_reaches_upstream() {
        let up = Arc::new(
            FakeUpstream::new().with_venue(FakeUpstream::venue(1, Some("12:00"), Some("14:00"))),
        );
        let o = setup(&up, Watchdog::disabled());
        let err = o.book(1, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::VenueClosed);
        assert_eq!(up.calls("reserve"), 0);
    }

    #[tokio::test]
    async fn unavailable_or_unknown_seat_never_reaches_upstream() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        let o = setup(&up, Watchdog::disabled());
        assert_eq!(o.book(1, "b").await.unwrap_err().kind, ErrorKind::SeatUnavailable);
        assert_eq!(o.book(1, "zz").await.unwrap_err().kind, ErrorKind::SeatUnavailable);
        assert_eq!(up.calls("reserve"), 0);
        // Snapshot was fetched once and reused.
        assert_eq!(up.calls("venue_layout"), 1);
    }

    #[tokio::test]
    async fn unlisted_venue_is_closed() {
        let up = Arc::new(FakeUpstream::new());
        let o = setup(&up, Watchdog::disabled());
        assert_eq!(o.book(1, "a").await.unwrap_err().kind, ErrorKind::VenueClosed);
    }

    #[tokio::test]
    async fn concurrent_book_submits_once() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.gate_reserve();
        let o = setup(&up, Watchdog::disabled());
        o.list_venues().await.unwrap();
        o.layout(1).await.unwrap();

        let first = tokio::spawn({
            let o = o.clone();
            async move { o.book(1, "a").await }
        });
        up.reserve_entered().await;

        let second = o.book(1, "a").await.unwrap_err();
        assert_eq!(second.kind, ErrorKind::AlreadyInFlight);

        up.release_reserve();
        first.await.unwrap().unwrap();
        assert_eq!(up.calls("reserve"), 1);
    }

    #[tokio::test]
    async fn queued_book_sees_reservation_made_while_waiting() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.gate_reserve();
        up.on_reserve_set_reservation(reserved("a", 1));
        let o = setup(&up, Watchdog::disabled());
        o.list_venues().await.unwrap();
        o.layout(1).await.unwrap();

        let first = tokio::spawn({
            let o = o.clone();
            async move { o.book(1, "a").await }
        });
        up.reserve_entered().await;
        let second = tokio::spawn({
            let o = o.clone();
            async move { o.book_queued(1, "a").await }
        });
        tokio::task::yield_now().await;
        up.release_reserve();

        first.await.unwrap().unwrap();
        let err = second.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::SeatUnavailable);
        assert!(err.message.contains("already holding seat a"));
        assert_eq!(up.calls("reserve"), 1);
        // The queued call re-read the reservation after the first finished.
        assert_eq!(up.calls("current_reservation"), 2);
    }

    #[tokio::test]
    async fn queued_book_checks_a_fresh_layout() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        let o = setup(&up, Watchdog::disabled());
        o.list_venues().await.unwrap();
        o.layout(1).await.unwrap();
        assert!(o.can_book(1, "a").await);

        // Someone else takes seat a after our snapshot was made.
        up.set_layout(1, json!({"seats": [{"key": "a", "name": "A-1", "rawStatus": 2}]}));
        let err = o.book_queued(1, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SeatUnavailable);
        assert_eq!(up.calls("reserve"), 0);
        assert_eq!(up.calls("venue_layout"), 2);
    }

    #[tokio::test]
    async fn rejected_caller_makes_no_upstream_calls() {
        let flight = SingleFlight::new();
        let busy = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        busy.gate_reserve();
        busy.set_layout(1, seats_layout());
        let first = BookingOrchestrator::new(
            "alice",
            busy.clone(),
            clock_at(10, 0),
            flight.clone(),
            Watchdog::disabled(),
        );
        let running = tokio::spawn({
            let first = first.clone();
            async move { first.book(1, "a").await }
        });
        busy.reserve_entered().await;

        // Cold cache: nothing fetched yet for this session.
        let cold = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        let second = BookingOrchestrator::new(
            "alice",
            cold.clone(),
            clock_at(10, 0),
            flight,
            Watchdog::disabled(),
        );
        let err = second.book(1, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyInFlight);
        assert_eq!(cold.calls("list_venues"), 0);
        assert_eq!(cold.calls("venue_layout"), 0);
        assert_eq!(cold.calls("reserve"), 0);

        busy.release_reserve();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn book_while_holding_a_reservation_is_local() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.set_reservation(Some(reserved("b", 2)));
        let o = setup(&up, Watchdog::disabled());
        o.refresh_reservation().await.unwrap();
        let err = o.book(1, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SeatUnavailable);
        assert_eq!(up.calls("reserve"), 0);
    }

    #[tokio::test]
    async fn ban_forces_tracker_refresh() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.fail_reserve(UpstreamError::Http {
            status: 403,
            body: r#"{"detail": "temporarily restricted reservation"}"#.into(),
        });
        let o = setup(&up, Watchdog::disabled());
        let err = o.book(1, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitedOrBanned);
        assert_eq!(up.calls("current_reservation"), 1);
    }

    #[tokio::test]
    async fn conflict_resolved_when_seat_turns_out_ours() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.fail_reserve(UpstreamError::Http {
            status: 500,
            body: r#"{"detail": "system did not confirm the seat"}"#.into(),
        });
        up.set_reservation(Some(reserved("a", 1)));
        let o = setup(&up, Watchdog::disabled());
        let r = o.book(1, "a").await.unwrap();
        assert!(r.confirmed_by_refresh);
    }

    #[tokio::test]
    async fn conflict_for_someone_else_is_reported() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.fail_reserve(UpstreamError::Http {
            status: 500,
            body: r#"{"detail": "system did not confirm the seat"}"#.into(),
        });
        let o = setup(&up, Watchdog::disabled());
        assert_eq!(o.book(1, "a").await.unwrap_err().kind, ErrorKind::SeatConflict);
    }

    #[tokio::test]
    async fn cancel_clears_optimistically() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.set_reservation(Some(reserved("a", 2)));
        let o = setup(&up, Watchdog::disabled());
        o.refresh_reservation().await.unwrap();
        assert!(o.is_mine(1, "a").await);
        o.cancel().await.unwrap();
        assert_eq!(o.tracker().state().await, ReservationState::None);
        assert_eq!(up.calls("cancel_reservation"), 1);
    }

    #[tokio::test]
    async fn ban_on_cancel_forces_tracker_refresh() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        up.set_reservation(Some(reserved("a", 2)));
        up.fail_cancel(UpstreamError::Http {
            status: 500,
            body: r#"{"errors": [{"code": 1}]}"#.into(),
        });
        let o = setup(&up, Watchdog::disabled());
        o.refresh_reservation().await.unwrap();
        assert_eq!(up.calls("current_reservation"), 1);

        let err = o.cancel().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitedOrBanned);
        assert_eq!(up.calls("current_reservation"), 2);
        assert!(o.is_mine(1, "a").await);
    }

    #[tokio::test]
    async fn sign_in_without_reservation_is_local() {
        let up = Arc::new(FakeUpstream::new());
        let o = setup(&up, Watchdog::disabled());
        let err = o.sign_in().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoActiveReservation);
        assert_eq!(up.calls("sign_in"), 0);
    }

    #[tokio::test]
    async fn sign_in_returns_upstream_message() {
        let up = Arc::new(FakeUpstream::new());
        up.set_reservation(Some(reserved("a", 1)));
        let o = setup(&up, Watchdog::disabled());
        o.refresh_reservation().await.unwrap();
        assert_eq!(o.sign_in().await.unwrap(), "signed in");
    }

    #[tokio::test]
    async fn can_book_combines_window_seat_and_reservation() {
        let up = Arc::new(FakeUpstream::new().with_venue(open_venue()));
        let o = setup(&up, Watchdog::disabled());
        assert!(!o.can_book(1, "a").await);
        o.list_venues().await.unwrap();
        o.layout(1).await.unwrap();
        assert!(o.can_book(1, "a").await);
        assert!(!o.can_book(1, "b").await);

        up.set_reservation(Some(reserved("b", 1)));
        o.refresh_reservation().await.unwrap();
        assert!(!o.can_book(1, "a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn supervised_refresh_triggers_one_auto_sign_in() {
        let up = Arc::new(FakeUpstream::new());
        up.set_reservation(Some(reserved("a", 5)));
        let o = setup(&up, Watchdog::new(Duration::from_secs(300), true));
        o.refresh_reservation().await.unwrap();
        o.refresh_reservation().await.unwrap();
        assert_eq!(o.watchdog().phase(), WatchdogPhase::Armed);

        tokio::time::sleep(Duration::from_secs(301)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(up.calls("sign_in"), 1);
        o.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_before_delay_skips_auto_sign_in() {
        let up = Arc::new(FakeUpstream::new());
        up.set_reservation(Some(reserved("a", 5)));
        let o = setup(&up, Watchdog::new(Duration::from_secs(300), true));
        o.refresh_reservation().await.unwrap();
        o.refresh_reservation().await.unwrap();
        up.set_reservation(Some(reserved("a", 2)));
        o.refresh_reservation().await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(up.calls("sign_in"), 0);
        assert_eq!(o.watchdog().phase(), WatchdogPhase::Idle);
    }
}
