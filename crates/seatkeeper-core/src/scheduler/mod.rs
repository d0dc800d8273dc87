//! Daily task scheduling.
//!
//! A task is due when the local clock has passed today's trigger, no more
//! than the misfire grace has elapsed since, and the task has not run since
//! the trigger. The in-memory [`RunLedger`] backs up the persisted `lastRun`
//! so a failed write-back cannot cause a second run on the same day.

pub mod runner;
pub mod store;

pub use runner::{RunOutcome, Scheduler};
pub use store::{RedbTaskStore, TaskStore};

use crate::task::Task;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Tasks from `tasks` that should run at `now`.
pub fn due_tasks(tasks: &[Task], now: NaiveDateTime, grace: Duration) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.enabled)
        .filter(|t| {
            let trigger = match t.trigger() {
                Ok(tr) => tr,
                Err(e) => {
                    warn!(task_id = t.id, "skipping task: {e}");
                    return false;
                }
            };
            let fire_at = now.date().and_time(trigger.time());
            if now < fire_at || now - fire_at > grace {
                return false;
            }
            t.last_run.map_or(true, |last| last < fire_at)
        })
        .cloned()
        .collect()
}

/// Remembers which tasks already ran on which local date.
#[derive(Default)]
pub struct RunLedger {
    seen: Mutex<HashSet<(u64, NaiveDate)>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(task_id, date)`. Returns false if it was already claimed.
    /// Entries from earlier dates are dropped.
    pub fn claim(&self, task_id: u64, date: NaiveDate) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.retain(|(_, d)| *d >= date);
        seen.insert((task_id, date))
    }
}
