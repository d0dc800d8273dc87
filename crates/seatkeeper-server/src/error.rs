use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use seatkeeper_core::booking::BookingError;
use seatkeeper_core::classifier::ErrorKind;
use seatkeeper_core::SeatError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BadRequest(String);

impl std::fmt::Display for BadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequest {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is always
/// `{"error": message, "kind": snake_case_kind}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequest(msg.into()).into())
    }
}

fn booking_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimitedOrBanned => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::BindingRequired | ErrorKind::PreselectFailed | ErrorKind::CancelFailed => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::SeatConflict
        | ErrorKind::VenueClosed
        | ErrorKind::SeatUnavailable
        | ErrorKind::AlreadyInFlight
        | ErrorKind::NoActiveReservation => StatusCode::CONFLICT,
        ErrorKind::Unknown => StatusCode::BAD_GATEWAY,
    }
}

fn seat_status(e: &SeatError) -> (StatusCode, &'static str) {
    match e {
        SeatError::UnknownAccount(_) => (StatusCode::NOT_FOUND, "unknown_account"),
        SeatError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "task_not_found"),
        SeatError::InvalidTask(_)
        | SeatError::InvalidCron(_)
        | SeatError::InvalidTime(_)
        | SeatError::InvalidUser(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        SeatError::NotConfigured | SeatError::MissingToken(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "not_configured")
        }
        SeatError::TaskStore(_) | SeatError::Io(_) | SeatError::Yaml(_) | SeatError::Json(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = if let Some(b) = self.0.downcast_ref::<BookingError>() {
            (booking_status(b.kind), b.kind.as_str())
        } else if let Some(e) = self.0.downcast_ref::<SeatError>() {
            seat_status(e)
        } else if self.0.downcast_ref::<BadRequest>().is_some() {
            (StatusCode::BAD_REQUEST, "invalid_request")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string(), "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
