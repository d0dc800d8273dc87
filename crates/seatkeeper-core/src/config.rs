use crate::error::{Result, SeatError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Name of an environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl AccountConfig {
    /// Inline token first, then the named environment variable.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(t) = self.token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(t.trim().to_string());
        }
        self.token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SeatError::MissingToken(self.user.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_misfire_grace_secs")]
    pub misfire_grace_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    20
}

fn default_misfire_grace_secs() -> u64 {
    120
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            misfire_grace_secs: default_misfire_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sign_in_delay_secs")]
    pub sign_in_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_sign_in_delay_secs() -> u64 {
    300
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sign_in_delay_secs: default_sign_in_delay_secs(),
        }
    }
}

impl WatchdogConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.sign_in_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset_minutes() -> i32 {
    480
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            upstream: UpstreamConfig::default(),
            accounts: Vec::new(),
            scheduler: SchedulerConfig::default(),
            watchdog: WatchdogConfig::default(),
            clock: ClockConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Starter config written by `config init`.
    pub fn sample() -> Self {
        Self {
            upstream: UpstreamConfig {
                base_url: "https://booking.example.edu/api/".into(),
                ..Default::default()
            },
            accounts: vec![AccountConfig {
                user: "alice".into(),
                token: None,
                token_env: Some("SEATKEEPER_TOKEN_ALICE".into()),
            }],
            ..Default::default()
        }
    }

    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::config_path(home);
        if !path.exists() {
            return Err(SeatError::NotConfigured);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        let path = paths::config_path(home);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn account(&self, user: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.user == user)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.upstream.base_url.trim().is_empty() {
            warnings.push(ConfigWarning::error("upstream.base_url is empty"));
        } else if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            warnings.push(ConfigWarning::error(format!(
                "upstream.base_url '{}' is not an http(s) URL",
                self.upstream.base_url
            )));
        }
        if self.upstream.timeout_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "upstream.timeout_secs is 0; requests will time out immediately",
            ));
        }

        if self.accounts.is_empty() {
            warnings.push(ConfigWarning::warning("no accounts configured"));
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if let Err(e) = paths::validate_user(&account.user) {
                warnings.push(ConfigWarning::error(e.to_string()));
            }
            if !seen.insert(account.user.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "account '{}' is listed more than once",
                    account.user
                )));
            }
            if account.token.is_none() && account.token_env.is_none() {
                warnings.push(ConfigWarning::error(format!(
                    "account '{}' has neither token nor token_env",
                    account.user
                )));
            } else if account.resolve_token().is_err() {
                warnings.push(ConfigWarning::warning(format!(
                    "account '{}' token is not currently resolvable",
                    account.user
                )));
            }
        }

        // Triggers are minute-granular; a slower tick could skip a minute.
        if self.scheduler.tick_interval_secs == 0 || self.scheduler.tick_interval_secs >= 60 {
            warnings.push(ConfigWarning::warning(format!(
                "scheduler.tick_interval_secs={} should be between 1 and 59",
                self.scheduler.tick_interval_secs
            )));
        }
        if self.scheduler.misfire_grace_secs < self.scheduler.tick_interval_secs {
            warnings.push(ConfigWarning::warning(
                "scheduler.misfire_grace_secs is shorter than the tick interval; triggers may be missed",
            ));
        }

        if self.watchdog.enabled && self.watchdog.sign_in_delay_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "watchdog.sign_in_delay_secs is 0; auto sign-in fires immediately",
            ));
        }

        if self.clock.utc_offset_minutes.abs() >= 24 * 60 {
            warnings.push(ConfigWarning::error(format!(
                "clock.utc_offset_minutes={} is outside ±24h",
                self.clock.utc_offset_minutes
            )));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
