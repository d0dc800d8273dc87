use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid upstream base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] seatkeeper_core::SeatError),
}
