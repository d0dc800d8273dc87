//! The booking backend as seen by the core.
//!
//! Implementations own transport and authentication. Every failure comes back
//! as an [`UpstreamError`] and is classified before it reaches a caller.

use crate::types::{FrequentSeat, Reservation, Venue, VenueId};
use futures::future::BoxFuture;
use std::fmt;

/// Raw failure from the booking backend, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// Non-success HTTP response. `body` is the raw response text.
    Http { status: u16, body: String },
    /// Connection, timeout or TLS failure.
    Transport(String),
    /// The response arrived but could not be decoded.
    Decode(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            UpstreamError::Transport(msg) => write!(f, "transport error: {msg}"),
            UpstreamError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// One authenticated user session against the booking backend.
///
/// Methods return boxed futures so the trait stays object-safe and the
/// orchestrator can hold an `Arc<dyn Upstream>`.
pub trait Upstream: Send + Sync {
    /// `GET venues`
    fn list_venues(&self) -> BoxFuture<'_, UpstreamResult<Vec<Venue>>>;

    /// `GET venues/{id}/layout`: the raw layout document. Shape varies by
    /// deployment, so decoding is left to the layout cache.
    fn venue_layout(&self, venue_id: VenueId) -> BoxFuture<'_, UpstreamResult<serde_json::Value>>;

    /// `GET reservation`: `None` when the user holds no reservation.
    fn current_reservation(&self) -> BoxFuture<'_, UpstreamResult<Option<Reservation>>>;

    /// `POST reservation?venueId&seatKey`
    fn reserve<'a>(&'a self, venue_id: VenueId, seat_key: &'a str)
        -> BoxFuture<'a, UpstreamResult<()>>;

    /// `DELETE reservation`
    fn cancel_reservation(&self) -> BoxFuture<'_, UpstreamResult<()>>;

    /// `POST signin`: the beacon sign-in action; returns the upstream message.
    fn sign_in(&self) -> BoxFuture<'_, UpstreamResult<String>>;

    /// `GET frequent-seats`
    fn frequent_seats(&self) -> BoxFuture<'_, UpstreamResult<Vec<FrequentSeat>>>;
}
