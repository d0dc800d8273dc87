//! Task persistence.
//!
//! # Table design
//!
//! `TASKS` maps an 8-byte big-endian task id to the JSON-encoded [`Task`], so
//! a table scan returns tasks in creation order. `META` holds the id sequence
//! under `next_id`.

use std::path::Path;

use chrono::NaiveDateTime;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, SeatError};
use crate::task::{NewTask, RunStatus, Task, TaskPatch};

const TASKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tasks");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const NEXT_ID: &str = "next_id";

/// CRUD over persisted tasks. The scheduler only reads and calls
/// [`record_run`](TaskStore::record_run).
pub trait TaskStore: Send + Sync {
    fn list_tasks(&self) -> Result<Vec<Task>>;
    fn get_task(&self, id: u64) -> Result<Task>;
    fn create_task(&self, new: NewTask) -> Result<Task>;
    fn update_task(&self, id: u64, patch: &TaskPatch) -> Result<Task>;
    fn delete_task(&self, id: u64) -> Result<()>;
    fn toggle_task(&self, id: u64) -> Result<Task>;
    fn record_run(
        &self,
        id: u64,
        at: NaiveDateTime,
        status: RunStatus,
        message: &str,
    ) -> Result<Task>;

    fn tasks_for(&self, user: &str) -> Result<Vec<Task>> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|t| t.user == user)
            .collect())
    }
}

fn db_err(e: impl std::fmt::Display) -> SeatError {
    SeatError::TaskStore(e.to_string())
}

fn task_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

// ---------------------------------------------------------------------------
// RedbTaskStore
// ---------------------------------------------------------------------------

pub struct RedbTaskStore {
    db: Database,
}

impl RedbTaskStore {
    /// Open or create the database at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TASKS).map_err(db_err)?;
        wt.open_table(META).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Read-modify-write one task inside a single transaction. If `f` fails
    /// the transaction is dropped and nothing is written.
    fn modify<F>(&self, id: u64, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let key = task_key(id);
        let wt = self.db.begin_write().map_err(db_err)?;
        let task = {
            let mut table = wt.open_table(TASKS).map_err(db_err)?;
            let raw = table
                .get(key.as_slice())
                .map_err(db_err)?
                .map(|v| v.value().to_vec())
                .ok_or(SeatError::TaskNotFound(id))?;
            let mut task: Task = serde_json::from_slice(&raw)?;
            f(&mut task)?;
            let value = serde_json::to_vec(&task)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
            task
        };
        wt.commit().map_err(db_err)?;
        Ok(task)
    }
}

impl TaskStore for RedbTaskStore {
    fn list_tasks(&self) -> Result<Vec<Task>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TASKS).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    fn get_task(&self, id: u64) -> Result<Task> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TASKS).map_err(db_err)?;
        let key = task_key(id);
        let guard = table
            .get(key.as_slice())
            .map_err(db_err)?
            .ok_or(SeatError::TaskNotFound(id))?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    fn create_task(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let task = {
            let mut meta = wt.open_table(META).map_err(db_err)?;
            let id = meta
                .get(NEXT_ID)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(1);
            meta.insert(NEXT_ID, id + 1).map_err(db_err)?;

            let task = new.into_task(id)?;
            let value = serde_json::to_vec(&task)?;
            let mut table = wt.open_table(TASKS).map_err(db_err)?;
            table
                .insert(task_key(id).as_slice(), value.as_slice())
                .map_err(db_err)?;
            task
        };
        wt.commit().map_err(db_err)?;
        Ok(task)
    }

    fn update_task(&self, id: u64, patch: &TaskPatch) -> Result<Task> {
        self.modify(id, |t| patch.apply(t))
    }

    fn delete_task(&self, id: u64) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(TASKS).map_err(db_err)?;
            let old = table.remove(task_key(id).as_slice()).map_err(db_err)?;
            old.is_some()
        };
        if !removed {
            return Err(SeatError::TaskNotFound(id));
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn toggle_task(&self, id: u64) -> Result<Task> {
        self.modify(id, |t| {
            t.enabled = !t.enabled;
            Ok(())
        })
    }

    fn record_run(
        &self,
        id: u64,
        at: NaiveDateTime,
        status: RunStatus,
        message: &str,
    ) -> Result<Task> {
        self.modify(id, |t| {
            t.last_run = Some(at);
            t.last_status = Some(status);
            t.last_message = Some(message.to_string());
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
