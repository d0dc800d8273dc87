//! Venue list and per-venue seat layout memo.
//!
//! Each successful fetch replaces the previous snapshot wholesale; there is no
//! TTL. Callers decide when to refresh.

use crate::booking::BookingError;
use crate::types::{Seat, Venue, VenueId};
use crate::upstream::Upstream;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Outcome of a layout fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layout {
    Seats { seats: Vec<Seat> },
    /// The upstream answered but carried no usable seat list.
    NoSeatData,
}

impl Layout {
    pub fn seats(&self) -> &[Seat] {
        match self {
            Layout::Seats { seats } => seats,
            Layout::NoSeatData => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutSnapshot {
    pub layout: Layout,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct VenueCache {
    venues: RwLock<Vec<Venue>>,
    layouts: RwLock<HashMap<VenueId, LayoutSnapshot>>,
}

impl VenueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the venue list and memoize it.
    pub async fn list_venues(&self, upstream: &dyn Upstream) -> Result<Vec<Venue>, BookingError> {
        let venues = upstream
            .list_venues()
            .await
            .map_err(|e| BookingError::from_upstream(&e))?;
        debug!(count = venues.len(), "venue list refreshed");
        *self.venues.write().await = venues.clone();
        Ok(venues)
    }

    /// Last fetched copy of one venue.
    pub async fn venue(&self, venue_id: VenueId) -> Option<Venue> {
        self.venues
            .read()
            .await
            .iter()
            .find(|v| v.id == venue_id)
            .cloned()
    }

    /// Memoized venue, fetching the list once if it is not known yet.
    pub async fn venue_or_fetch(
        &self,
        upstream: &dyn Upstream,
        venue_id: VenueId,
    ) -> Result<Option<Venue>, BookingError> {
        if let Some(v) = self.venue(venue_id).await {
            return Ok(Some(v));
        }
        let venues = self.list_venues(upstream).await?;
        Ok(venues.into_iter().find(|v| v.id == venue_id))
    }

    /// Fetch a venue layout, replacing any prior snapshot for it.
    pub async fn get_layout(
        &self,
        upstream: &dyn Upstream,
        venue_id: VenueId,
    ) -> Result<Layout, BookingError> {
        let raw = upstream
            .venue_layout(venue_id)
            .await
            .map_err(|e| BookingError::from_upstream(&e))?;
        let layout = parse_layout(&raw);
        if matches!(layout, Layout::NoSeatData) {
            warn!(venue_id, "layout response carried no seat data");
        }
        self.layouts.write().await.insert(
            venue_id,
            LayoutSnapshot {
                layout: layout.clone(),
                fetched_at: Utc::now(),
            },
        );
        Ok(layout)
    }

    pub async fn snapshot(&self, venue_id: VenueId) -> Option<LayoutSnapshot> {
        self.layouts.read().await.get(&venue_id).cloned()
    }

    /// Look up a seat in the last snapshot for `venue_id`.
    pub async fn find_seat(&self, venue_id: VenueId, seat_key: &str) -> Option<Seat> {
        self.layouts
            .read()
            .await
            .get(&venue_id)
            .and_then(|s| s.layout.seats().iter().find(|seat| seat.key == seat_key))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Layout decoding
// ---------------------------------------------------------------------------

/// Decode a layout document.
///
/// Accepted shapes: a bare seat array, `{seats: [...]}`, `{layout: {seats}}`,
/// `{lib_layout: {seats}}`, or a one-element list of any of those. Seats
/// without a key are dropped. Anything else is `NoSeatData`.
pub fn parse_layout(raw: &Value) -> Layout {
    let seats: Vec<Seat> = find_seat_array(raw, 0)
        .map(|items| items.iter().filter_map(parse_seat).collect())
        .unwrap_or_default();
    if seats.is_empty() {
        Layout::NoSeatData
    } else {
        Layout::Seats { seats }
    }
}

fn find_seat_array(v: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > 3 {
        return None;
    }
    match v {
        Value::Array(items) if items.iter().any(|i| i.get("key").is_some()) => Some(items),
        Value::Array(items) => items.first().and_then(|i| find_seat_array(i, depth + 1)),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("seats") {
                return Some(items);
            }
            ["layout", "lib_layout", "libLayout"]
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(|inner| find_seat_array(inner, depth + 1))
        }
        _ => None,
    }
}

fn int_of(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn parse_seat(v: &Value) -> Option<Seat> {
    let key = match v.get("key")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let name = v
        .get("name")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| key.clone());
    // Deployments report availability under different fields; any of them
    // saying "available" wins.
    let candidates = [
        int_of(v.get("rawStatus")),
        int_of(v.get("seat_status")),
        int_of(v.get("status")),
    ];
    let raw_status = if candidates.contains(&Some(1)) {
        1
    } else {
        candidates.into_iter().flatten().next().unwrap_or(0)
    };
    Some(Seat {
        key,
        name,
        raw_status,
        kind: int_of(v.get("type")).unwrap_or(0),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
