use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use seatkeeper_core::clock::Clock;
use seatkeeper_core::layout::Layout;
use seatkeeper_core::types::{FrequentSeat, SeatStatus, Venue, VenueId};
use seatkeeper_core::window;
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/accounts/{user}/venues: fetch and cache the venue list.
pub async fn list_venues(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<Venue>>, AppError> {
    let account = app.account(&user)?;
    Ok(Json(account.list_venues().await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub key: String,
    pub name: String,
    pub status: SeatStatus,
    pub raw_status: i64,
    pub bookable: bool,
    pub mine: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutView {
    pub venue_id: VenueId,
    pub venue: Option<Venue>,
    pub open: bool,
    /// False when the upstream answered without a usable seat list.
    pub has_seat_data: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub seats: Vec<SeatView>,
}

/// GET /api/accounts/{user}/venues/{id}/layout: fresh layout with per-seat
/// `bookable` and `mine` flags.
pub async fn get_layout(
    State(app): State<AppState>,
    Path((user, venue_id)): Path<(String, VenueId)>,
) -> Result<Json<LayoutView>, AppError> {
    let account = app.account(&user)?;
    if account.cache().venue(venue_id).await.is_none() {
        account.list_venues().await?;
    }
    let layout = account.layout(venue_id).await?;
    if let Err(e) = account.refresh_reservation().await {
        warn!(user = %user, kind = ?e.kind, "layout view using last known reservation: {e}");
    }

    let venue = account.cache().venue(venue_id).await;
    let open = venue
        .as_ref()
        .is_some_and(|v| window::is_open(v, account.clock().time_of_day()));
    let mut seats = Vec::with_capacity(layout.seats().len());
    for seat in layout.seats() {
        seats.push(SeatView {
            key: seat.key.clone(),
            name: seat.name.clone(),
            status: seat.status(),
            raw_status: seat.raw_status,
            bookable: account.can_book(venue_id, &seat.key).await,
            mine: account.is_mine(venue_id, &seat.key).await,
        });
    }
    let fetched_at = account
        .cache()
        .snapshot(venue_id)
        .await
        .map(|s| s.fetched_at);

    Ok(Json(LayoutView {
        venue_id,
        venue,
        open,
        has_seat_data: !matches!(layout, Layout::NoSeatData),
        fetched_at,
        seats,
    }))
}

/// GET /api/accounts/{user}/frequent-seats
pub async fn frequent_seats(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<FrequentSeat>>, AppError> {
    let account = app.account(&user)?;
    Ok(Json(account.frequent_seats().await?))
}
