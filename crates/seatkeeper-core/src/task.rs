use crate::error::{Result, SeatError};
use crate::types::VenueId;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[serde(alias = "seat_today", alias = "seat_tomorrow")]
    Reserve,
    Signin,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskType::Reserve => "reserve",
            TaskType::Signin => "signin",
        })
    }
}

/// Seat selection for `reserve` tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Book the configured seat once.
    #[default]
    Custom,
    /// Walk the user's frequent seats in order until one books.
    DefaultAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
    /// Nothing to do: a reserve task found a reservation already held.
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Skipped => "skipped",
        })
    }
}

// ---------------------------------------------------------------------------
// DailyTrigger
// ---------------------------------------------------------------------------

/// A once-a-day trigger, stored as the cron subset `"M H * * *"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTrigger {
    /// Parse `"M H * * *"`. Minute and hour may be zero-padded.
    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = || SeatError::InvalidCron(expr.to_string());
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(invalid());
        };
        if [dom, month, dow].iter().any(|f| **f != "*") {
            return Err(invalid());
        }
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        if minute > 59 || hour > 23 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }

    /// Parse a strict `HH:MM` wall-clock time.
    pub fn from_wall_clock(s: &str) -> Result<Self> {
        let t = NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map_err(|_| SeatError::InvalidTime(s.to_string()))?;
        Ok(Self {
            hour: t.hour(),
            minute: t.minute(),
        })
    }

    pub fn to_cron(self) -> String {
        format!("{} {} * * *", self.minute, self.hour)
    }

    pub fn time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for DailyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(default, alias = "libId", alias = "lib_id", skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
    #[serde(default, alias = "seat_key", skip_serializing_if = "Option::is_none")]
    pub seat_key: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
}

/// A persisted daily automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub user: String,
    pub name: String,
    pub task_type: TaskType,
    pub cron_expression: String,
    #[serde(alias = "isEnabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: TaskConfig,
    /// Venue-local time of the last execution.
    #[serde(default)]
    pub last_run: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_status: Option<RunStatus>,
    #[serde(default)]
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn trigger(&self) -> Result<DailyTrigger> {
        DailyTrigger::parse(&self.cron_expression)
    }
}

fn check_config(task_type: TaskType, config: &TaskConfig) -> Result<()> {
    if task_type != TaskType::Reserve || config.strategy != Strategy::Custom {
        return Ok(());
    }
    if config.venue_id.is_none() {
        return Err(SeatError::InvalidTask(
            "custom reserve task needs a venue id".into(),
        ));
    }
    if config.seat_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        return Err(SeatError::InvalidTask(
            "custom reserve task needs a seat key".into(),
        ));
    }
    Ok(())
}

/// Resolve a trigger from either a cron expression or an `HH:MM` time.
fn resolve_cron(cron: Option<&str>, time: Option<&str>) -> Result<String> {
    match (cron, time) {
        (Some(c), _) => Ok(DailyTrigger::parse(c)?.to_cron()),
        (None, Some(t)) => Ok(DailyTrigger::from_wall_clock(t)?.to_cron()),
        (None, None) => Err(SeatError::InvalidTask(
            "a cron expression or HH:MM time is required".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// NewTask / TaskPatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub user: String,
    pub name: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub cron_expression: Option<String>,
    /// `HH:MM`, converted to a cron expression when `cron_expression` is absent.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default = "default_true", alias = "isEnabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: TaskConfig,
}

fn default_true() -> bool {
    true
}

impl NewTask {
    /// Check the definition and return the normalized cron expression.
    pub fn validate(&self) -> Result<String> {
        if self.user.trim().is_empty() {
            return Err(SeatError::InvalidTask("user is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(SeatError::InvalidTask("name is required".into()));
        }
        check_config(self.task_type, &self.config)?;
        resolve_cron(self.cron_expression.as_deref(), self.time.as_deref())
    }

    pub fn into_task(self, id: u64) -> Result<Task> {
        let cron_expression = self.validate()?;
        Ok(Task {
            id,
            user: self.user,
            name: self.name.trim().to_string(),
            task_type: self.task_type,
            cron_expression,
            enabled: self.enabled,
            config: self.config,
            last_run: None,
            last_status: None,
            last_message: None,
            created_at: Utc::now(),
        })
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, alias = "isEnabled")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub config: Option<TaskConfig>,
}

impl TaskPatch {
    /// Apply to `task`, leaving it untouched if the result would be invalid.
    pub fn apply(&self, task: &mut Task) -> Result<()> {
        let mut next = task.clone();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(SeatError::InvalidTask("name is required".into()));
            }
            next.name = name.trim().to_string();
        }
        if let Some(t) = self.task_type {
            next.task_type = t;
        }
        if self.cron_expression.is_some() || self.time.is_some() {
            next.cron_expression =
                resolve_cron(self.cron_expression.as_deref(), self.time.as_deref())?;
        }
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(config) = &self.config {
            next.config = config.clone();
        }
        check_config(next.task_type, &next.config)?;
        *task = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
