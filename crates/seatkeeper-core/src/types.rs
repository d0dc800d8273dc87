use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type VenueId = i64;

// ---------------------------------------------------------------------------
// Venue
// ---------------------------------------------------------------------------

/// A bookable location (library floor / reading room).
///
/// `open_time` / `close_time` are local wall-clock `HH:MM` strings. When
/// either is missing the venue is treated as always open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    /// `1` = open-capable, `0` = closed.
    #[serde(default)]
    pub status: u8,
    #[serde(default, alias = "open_time", alias = "open_time_str")]
    pub open_time: Option<String>,
    #[serde(default, alias = "close_time", alias = "close_time_str")]
    pub close_time: Option<String>,
}

impl Venue {
    pub fn is_open_capable(&self) -> bool {
        self.status == 1
    }
}

// ---------------------------------------------------------------------------
// SeatStatus
// ---------------------------------------------------------------------------

/// Upstream seat / reservation status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Unavailable,
    Available,
    CheckedIn,
    Seated,
    Away,
    Supervised,
}

impl SeatStatus {
    /// Unknown codes collapse to `Unavailable`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SeatStatus::Available,
            2 => SeatStatus::CheckedIn,
            3 => SeatStatus::Seated,
            4 => SeatStatus::Away,
            5 => SeatStatus::Supervised,
            _ => SeatStatus::Unavailable,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SeatStatus::Unavailable => 0,
            SeatStatus::Available => 1,
            SeatStatus::CheckedIn => 2,
            SeatStatus::Seated => 3,
            SeatStatus::Away => 4,
            SeatStatus::Supervised => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// One seat inside a venue layout snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub key: String,
    pub name: String,
    pub raw_status: i64,
    #[serde(default, rename = "type")]
    pub kind: i64,
}

impl Seat {
    pub fn status(&self) -> SeatStatus {
        SeatStatus::from_code(self.raw_status)
    }

    pub fn is_available(&self) -> bool {
        self.raw_status == 1
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStatus {
    #[serde(rename = "reserved")]
    Reserved,
    #[serde(rename = "checked-in")]
    CheckedIn,
}

/// The user's single active seat hold, exactly as the upstream reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(alias = "lib_id", alias = "libId")]
    pub venue_id: VenueId,
    #[serde(alias = "seat_key")]
    pub seat_key: String,
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_status: Option<SelectionStatus>,
    #[serde(default, alias = "seat_name", skip_serializing_if = "Option::is_none")]
    pub seat_name: Option<String>,
    /// Local date the hold applies to; past dates are stale records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl Reservation {
    pub fn state(&self) -> ReservationState {
        ReservationState::from_code(self.status)
    }
}

// ---------------------------------------------------------------------------
// ReservationState
// ---------------------------------------------------------------------------

/// Observed lifecycle of the user's reservation.
///
/// `None → Reserved → CheckedIn → Seated ⇄ Away`, with `Supervised` reachable
/// from any active state. Transitions are only ever observed from the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    None,
    Reserved,
    CheckedIn,
    Seated,
    Away,
    Supervised,
}

impl ReservationState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ReservationState::Reserved,
            2 => ReservationState::CheckedIn,
            3 => ReservationState::Seated,
            4 => ReservationState::Away,
            5 => ReservationState::Supervised,
            _ => ReservationState::None,
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, ReservationState::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationState::None => "none",
            ReservationState::Reserved => "reserved",
            ReservationState::CheckedIn => "checked_in",
            ReservationState::Seated => "seated",
            ReservationState::Away => "away",
            ReservationState::Supervised => "supervised",
        }
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FrequentSeat
// ---------------------------------------------------------------------------

/// A user-saved seat shortcut, tried in order by `default_all` reserve tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequentSeat {
    #[serde(alias = "lib_id", alias = "libId")]
    pub venue_id: VenueId,
    #[serde(alias = "seat_key")]
    pub seat_key: String,
    #[serde(default, alias = "info")]
    pub label: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
