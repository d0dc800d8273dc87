use axum::extract::{Path, Query, State};
use axum::Json;
use seatkeeper_core::booking::BookingResult;
use seatkeeper_core::types::{Reservation, ReservationState, VenueId};
use seatkeeper_core::watchdog::WatchdogPhase;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ReservationQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct ReservationView {
    pub reservation: Option<Reservation>,
    pub state: ReservationState,
    pub watchdog: WatchdogPhase,
}

/// GET /api/accounts/{user}/reservation: the tracked reservation.
/// `?refresh=true` re-queries the upstream first.
pub async fn get_reservation(
    State(app): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<ReservationView>, AppError> {
    let account = app.account(&user)?;
    let reservation = if query.refresh {
        account.refresh_reservation().await?
    } else {
        account.tracker().current().await
    };
    Ok(Json(ReservationView {
        state: reservation
            .as_ref()
            .map_or(ReservationState::None, Reservation::state),
        reservation,
        watchdog: account.watchdog().phase(),
    }))
}

#[derive(Deserialize)]
pub struct BookBody {
    #[serde(alias = "venueId")]
    pub venue_id: Option<VenueId>,
    #[serde(alias = "seatKey")]
    pub seat_key: Option<String>,
}

/// POST /api/accounts/{user}/reservation: book a seat.
pub async fn book(
    State(app): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<BookBody>,
) -> Result<Json<BookingResult>, AppError> {
    let venue_id = body
        .venue_id
        .ok_or_else(|| AppError::bad_request("venue_id is required"))?;
    let seat_key = body
        .seat_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("seat_key is required"))?;
    let account = app.account(&user)?;
    Ok(Json(account.book(venue_id, &seat_key).await?))
}

/// DELETE /api/accounts/{user}/reservation
pub async fn cancel(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = app.account(&user)?;
    account.cancel().await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// POST /api/accounts/{user}/signin
pub async fn sign_in(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = app.account(&user)?;
    let message = account.sign_in().await?;
    Ok(Json(serde_json::json!({ "message": message })))
}
