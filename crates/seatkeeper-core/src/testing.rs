//! Scriptable in-memory upstream for unit tests.

use crate::types::{FrequentSeat, Reservation, Venue, VenueId};
use crate::upstream::{Upstream, UpstreamError, UpstreamResult};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    venues: Vec<Venue>,
    layouts: HashMap<VenueId, Value>,
    reservation: Option<Reservation>,
    frequent: Vec<FrequentSeat>,
    venues_error: Option<UpstreamError>,
    reservation_error: Option<UpstreamError>,
    reserve_error: Option<UpstreamError>,
    reserve_errors_by_seat: HashMap<String, UpstreamError>,
    on_reserve: Option<Reservation>,
    sign_in_error: Option<UpstreamError>,
    cancel_error: Option<UpstreamError>,
    calls: HashMap<&'static str, usize>,
    reserved_seats: Vec<(VenueId, String)>,
    gated: bool,
}

#[derive(Default)]
pub struct FakeUpstream {
    state: Mutex<State>,
    entered: Notify,
    release: Notify,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open-capable venue with the given hours.
    pub fn venue(id: VenueId, open: Option<&str>, close: Option<&str>) -> Venue {
        Venue {
            id,
            name: format!("Venue {id}"),
            status: 1,
            open_time: open.map(String::from),
            close_time: close.map(String::from),
        }
    }

    pub fn with_venue(self, venue: Venue) -> Self {
        self.lock().venues.push(venue);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn count(&self, name: &'static str) {
        *self.lock().calls.entry(name).or_default() += 1;
    }

    pub fn calls(&self, name: &str) -> usize {
        self.lock().calls.get(name).copied().unwrap_or(0)
    }

    pub fn reserved_seats(&self) -> Vec<(VenueId, String)> {
        self.lock().reserved_seats.clone()
    }

    pub fn set_layout(&self, venue_id: VenueId, layout: Value) {
        self.lock().layouts.insert(venue_id, layout);
    }

    pub fn set_reservation(&self, r: Option<Reservation>) {
        let mut s = self.lock();
        s.reservation = r;
        s.reservation_error = None;
    }

    pub fn set_frequent(&self, seats: Vec<FrequentSeat>) {
        self.lock().frequent = seats;
    }

    pub fn fail_venues(&self, e: UpstreamError) {
        self.lock().venues_error = Some(e);
    }

    pub fn fail_reservation(&self, e: UpstreamError) {
        self.lock().reservation_error = Some(e);
    }

    pub fn fail_reserve(&self, e: UpstreamError) {
        self.lock().reserve_error = Some(e);
    }

    pub fn fail_reserve_for(&self, seat_key: &str, e: UpstreamError) {
        self.lock()
            .reserve_errors_by_seat
            .insert(seat_key.to_string(), e);
    }

    pub fn fail_cancel(&self, e: UpstreamError) {
        self.lock().cancel_error = Some(e);
    }

    pub fn fail_sign_in(&self, e: UpstreamError) {
        self.lock().sign_in_error = Some(e);
    }

    /// After a successful reserve, report `r` as the current reservation.
    pub fn on_reserve_set_reservation(&self, r: Reservation) {
        self.lock().on_reserve = Some(r);
    }

    /// Make every reserve call block until [`release_reserve`](Self::release_reserve).
    pub fn gate_reserve(&self) {
        self.lock().gated = true;
    }

    pub async fn reserve_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release_reserve(&self) {
        self.release.notify_one();
    }
}

impl Upstream for FakeUpstream {
    fn list_venues(&self) -> BoxFuture<'_, UpstreamResult<Vec<Venue>>> {
        Box::pin(async move {
            self.count("list_venues");
            let s = self.lock();
            match &s.venues_error {
                Some(e) => Err(e.clone()),
                None => Ok(s.venues.clone()),
            }
        })
    }

    fn venue_layout(&self, venue_id: VenueId) -> BoxFuture<'_, UpstreamResult<Value>> {
        Box::pin(async move {
            self.count("venue_layout");
            Ok(self
                .lock()
                .layouts
                .get(&venue_id)
                .cloned()
                .unwrap_or(Value::Null))
        })
    }

    fn current_reservation(&self) -> BoxFuture<'_, UpstreamResult<Option<Reservation>>> {
        Box::pin(async move {
            self.count("current_reservation");
            let s = self.lock();
            match &s.reservation_error {
                Some(e) => Err(e.clone()),
                None => Ok(s.reservation.clone()),
            }
        })
    }

    fn reserve<'a>(
        &'a self,
        venue_id: VenueId,
        seat_key: &'a str,
    ) -> BoxFuture<'a, UpstreamResult<()>> {
        Box::pin(async move {
            self.count("reserve");
            let gated = self.lock().gated;
            if gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
            let mut s = self.lock();
            if let Some(e) = s.reserve_errors_by_seat.get(seat_key) {
                return Err(e.clone());
            }
            if let Some(e) = &s.reserve_error {
                return Err(e.clone());
            }
            s.reserved_seats.push((venue_id, seat_key.to_string()));
            if let Some(r) = s.on_reserve.clone() {
                s.reservation = Some(r);
            }
            Ok(())
        })
    }

    fn cancel_reservation(&self) -> BoxFuture<'_, UpstreamResult<()>> {
        Box::pin(async move {
            self.count("cancel_reservation");
            let mut s = self.lock();
            if let Some(e) = &s.cancel_error {
                return Err(e.clone());
            }
            s.reservation = None;
            Ok(())
        })
    }

    fn sign_in(&self) -> BoxFuture<'_, UpstreamResult<String>> {
        Box::pin(async move {
            self.count("sign_in");
            match &self.lock().sign_in_error {
                Some(e) => Err(e.clone()),
                None => Ok("signed in".to_string()),
            }
        })
    }

    fn frequent_seats(&self) -> BoxFuture<'_, UpstreamResult<Vec<FrequentSeat>>> {
        Box::pin(async move {
            self.count("frequent_seats");
            Ok(self.lock().frequent.clone())
        })
    }
}
