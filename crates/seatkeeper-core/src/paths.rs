use crate::error::{Result, SeatError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Layout of the home directory
// ---------------------------------------------------------------------------

pub const HOME_DIR: &str = ".seatkeeper";
pub const HOME_ENV: &str = "SEATKEEPER_HOME";

pub const CONFIG_FILE: &str = "config.yaml";
pub const TASKS_DB: &str = "tasks.redb";

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn tasks_db_path(home: &Path) -> PathBuf {
    home.join(TASKS_DB)
}

/// Resolve the home directory: explicit path, then `$SEATKEEPER_HOME`, then
/// `~/.seatkeeper`, then `./.seatkeeper`.
pub fn resolve_home(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Some(p) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(p);
    }
    match home::home_dir() {
        Some(h) => h.join(HOME_DIR),
        None => PathBuf::from(HOME_DIR),
    }
}

// ---------------------------------------------------------------------------
// Account names
// ---------------------------------------------------------------------------

static USER_RE: OnceLock<Regex> = OnceLock::new();

fn user_re() -> &'static Regex {
    USER_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@\-]*$").unwrap())
}

/// Account names appear in URL paths and log fields, so keep them plain.
pub fn validate_user(user: &str) -> Result<()> {
    if user.is_empty() || user.len() > 64 || !user_re().is_match(user) {
        return Err(SeatError::InvalidUser(user.to_string()));
    }
    Ok(())
}
