//! Opening-hours gate for venues.
//!
//! Bounds are compared as minutes since local midnight. A window whose close
//! bound is earlier than its open bound wraps past midnight.

use crate::types::Venue;
use chrono::{NaiveTime, Timelike};

/// Parse an `HH:MM` wall-clock string into minutes since midnight.
///
/// Non-numeric components count as zero, matching how the booking frontend
/// interprets partially filled venue hours. Returns `None` only for an empty
/// string.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut parts = s.splitn(3, ':');
    let h = parts
        .next()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let m = parts
        .next()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    Some(h * 60 + m)
}

fn minutes_of(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Whether `venue` accepts bookings at local time `at`.
pub fn is_open(venue: &Venue, at: NaiveTime) -> bool {
    if !venue.is_open_capable() {
        return false;
    }
    let (Some(open), Some(close)) = (
        venue.open_time.as_deref().and_then(parse_hhmm),
        venue.close_time.as_deref().and_then(parse_hhmm),
    ) else {
        return true;
    };
    let now = minutes_of(at);
    if close >= open {
        now >= open && now <= close
    } else {
        now >= open || now <= close
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
