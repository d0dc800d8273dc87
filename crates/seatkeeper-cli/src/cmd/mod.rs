pub mod booking;
pub mod config;
pub mod serve;
pub mod task;

use anyhow::{bail, Context};
use seatkeeper_core::account::AccountRegistry;
use seatkeeper_core::clock::{Clock, SystemClock};
use seatkeeper_core::config::Config;
use std::path::Path;
use std::sync::Arc;

pub fn load_config(home: &Path) -> anyhow::Result<Config> {
    Config::load(home).with_context(|| format!("failed to load config from {}", home.display()))
}

/// The explicit `--user`, or the only configured account.
pub fn pick_user(config: &Config, explicit: Option<&str>) -> anyhow::Result<String> {
    if let Some(u) = explicit {
        if config.account(u).is_none() {
            bail!("account '{u}' is not configured");
        }
        return Ok(u.to_string());
    }
    match config.accounts.as_slice() {
        [only] => Ok(only.user.clone()),
        [] => bail!("no accounts configured; edit config.yaml"),
        _ => bail!("several accounts configured; pass --user"),
    }
}

pub fn venue_clock(config: &Config) -> Arc<dyn Clock> {
    Arc::new(SystemClock::with_offset_minutes(
        config.clock.utc_offset_minutes,
    ))
}

/// One upstream session per configured account.
pub fn open_accounts(config: &Config) -> anyhow::Result<Arc<AccountRegistry>> {
    let registry = seatkeeper_client::connect(config, venue_clock(config))
        .context("failed to open upstream sessions")?;
    Ok(Arc::new(registry))
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
