use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeatError {
    #[error("not configured: run 'seatkeeper config init'")]
    NotConfigured,

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("invalid account name '{0}': use letters, digits, '.', '_', '@' or '-'")]
    InvalidUser(String),

    #[error("no token for account '{0}': set token or token_env")]
    MissingToken(String),

    #[error("task not found: {0}")]
    TaskNotFound(u64),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("invalid cron expression '{0}': expected 'M H * * *'")]
    InvalidCron(String),

    #[error("invalid wall-clock time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("task store error: {0}")]
    TaskStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SeatError>;
