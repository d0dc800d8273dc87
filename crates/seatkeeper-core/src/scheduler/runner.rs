use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{due_tasks, RunLedger, TaskStore};
use crate::account::AccountRegistry;
use crate::booking::{BookingError, BookingOrchestrator};
use crate::classifier::ErrorKind;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::task::{RunStatus, Strategy, Task, TaskConfig, TaskType};
use crate::types::Reservation;

/// What one task execution produced; persisted onto the task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: String,
}

impl RunOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failure,
            message: message.into(),
        }
    }

    fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Skipped,
            message: message.into(),
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    accounts: Arc<AccountRegistry>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    misfire_grace: chrono::Duration,
    ledger: RunLedger,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        accounts: Arc<AccountRegistry>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            accounts,
            clock,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            misfire_grace: chrono::Duration::seconds(config.misfire_grace_secs as i64),
            ledger: RunLedger::new(),
        })
    }

    /// Evaluate due tasks at `now` and start each as its own tokio task.
    pub fn tick(self: &Arc<Self>, now: NaiveDateTime) -> Result<Vec<JoinHandle<RunOutcome>>> {
        let tasks = self.store.list_tasks()?;
        let due = due_tasks(&tasks, now, self.misfire_grace);
        let mut handles = Vec::new();
        for task in due {
            if !self.ledger.claim(task.id, now.date()) {
                debug!(task_id = task.id, "already ran today");
                continue;
            }
            info!(task_id = task.id, user = %task.user, task_type = %task.task_type, name = %task.name, "task due");
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move { this.execute(&task).await }));
        }
        Ok(handles)
    }

    /// Run one task to completion and persist the outcome. Never fails: every
    /// problem is recorded on the task.
    pub async fn execute(&self, task: &Task) -> RunOutcome {
        let outcome = match self.accounts.get(&task.user) {
            Err(e) => RunOutcome::failure(e.to_string()),
            Ok(o) => match task.task_type {
                TaskType::Signin => run_signin(&o).await,
                TaskType::Reserve => run_reserve(&o, &task.config).await,
            },
        };

        match outcome.status {
            RunStatus::Failure => {
                warn!(task_id = task.id, user = %task.user, status = %outcome.status, "task finished: {}", outcome.message)
            }
            _ => {
                info!(task_id = task.id, user = %task.user, status = %outcome.status, "task finished: {}", outcome.message)
            }
        }
        if let Err(e) =
            self.store
                .record_run(task.id, self.clock.now(), outcome.status, &outcome.message)
        {
            error!(task_id = task.id, "could not record task run: {e}");
        }
        outcome
    }

    /// Tick until `shutdown` resolves, then wait for in-flight runs.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            accounts = self.accounts.len(),
            "scheduler started"
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running: Vec<JoinHandle<RunOutcome>> = Vec::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    match self.tick(self.clock.now()) {
                        Ok(handles) => running.extend(handles),
                        Err(e) => error!("scheduler tick failed: {e}"),
                    }
                    running.retain(|h| !h.is_finished());
                }
            }
        }

        info!(in_flight = running.len(), "scheduler stopping");
        for h in running {
            if let Err(e) = h.await {
                error!("task run aborted: {e}");
            }
        }
    }
}

async fn run_signin(o: &Arc<BookingOrchestrator>) -> RunOutcome {
    if let Err(e) = o.refresh_reservation().await {
        return RunOutcome::failure(e.message);
    }
    match o.sign_in_queued().await {
        Ok(msg) => RunOutcome::success(msg),
        Err(e) => RunOutcome::failure(e.message),
    }
}

async fn run_reserve(o: &Arc<BookingOrchestrator>, config: &TaskConfig) -> RunOutcome {
    match o.refresh_reservation().await {
        Ok(Some(r)) => return already_holding(&r),
        Ok(None) => {}
        Err(e) => return RunOutcome::failure(e.message),
    }

    match config.strategy {
        Strategy::Custom => {
            let (Some(venue_id), Some(seat_key)) = (config.venue_id, config.seat_key.as_deref())
            else {
                return RunOutcome::failure("task has no seat configured");
            };
            match o.book_queued(venue_id, seat_key).await {
                Ok(r) => RunOutcome::success(format!("booked {} at venue {venue_id}", r.seat_name)),
                Err(e) => match held_reservation(o, &e).await {
                    Some(skipped) => skipped,
                    None => RunOutcome::failure(e.message),
                },
            }
        }
        Strategy::DefaultAll => book_first_frequent(o).await,
    }
}

fn already_holding(r: &Reservation) -> RunOutcome {
    RunOutcome::skipped(format!(
        "already holding seat {} at venue {} ({})",
        r.seat_key,
        r.venue_id,
        r.state()
    ))
}

/// A queued booking that found a reservation once it got its turn: work
/// that ran ahead of it already holds a seat for this user.
async fn held_reservation(o: &BookingOrchestrator, e: &BookingError) -> Option<RunOutcome> {
    if e.kind != ErrorKind::SeatUnavailable {
        return None;
    }
    o.tracker().current().await.map(|r| already_holding(&r))
}

/// Try each frequent seat in order against a fresh layout. The first
/// success wins; account-level failures stop the walk.
async fn book_first_frequent(o: &Arc<BookingOrchestrator>) -> RunOutcome {
    let seats = match o.frequent_seats().await {
        Ok(s) => s,
        Err(e) => return RunOutcome::failure(e.message),
    };
    if seats.is_empty() {
        return RunOutcome::failure("no frequent seats saved");
    }

    let mut last_error = None;
    for seat in &seats {
        match o.book_queued(seat.venue_id, &seat.seat_key).await {
            Ok(r) => {
                return RunOutcome::success(format!(
                    "booked {} at venue {}",
                    r.seat_name, seat.venue_id
                ))
            }
            Err(e) if e.kind.is_account_level() => {
                warn!(user = %o.user(), kind = ?e.kind, "stopping frequent-seat walk");
                return RunOutcome::failure(e.message);
            }
            Err(e) => {
                if let Some(skipped) = held_reservation(o, &e).await {
                    return skipped;
                }
                debug!(user = %o.user(), venue_id = seat.venue_id, seat_key = %seat.seat_key, kind = ?e.kind, "frequent seat not booked");
                last_error = Some(e);
            }
        }
    }
    let detail = last_error.map(|e| e.message).unwrap_or_default();
    RunOutcome::failure(format!(
        "none of {} frequent seats could be booked (last: {detail})",
        seats.len()
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::scheduler::RedbTaskStore;
    use crate::task::NewTask;
    use crate::testing::FakeUpstream;
    use crate::types::{FrequentSeat, Reservation};
    use crate::upstream::UpstreamError;
    use crate::watchdog::Watchdog;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<RedbTaskStore>,
        up: Arc<FakeUpstream>,
        clock: Arc<FixedClock>,
        accounts: Arc<AccountRegistry>,
        scheduler: Arc<Scheduler>,
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 10)
            .unwrap()
            .and_time(chrono::NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap())
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbTaskStore::open(&dir.path().join("tasks.redb")).unwrap());
        let up = Arc::new(
            FakeUpstream::new().with_venue(FakeUpstream::venue(1, Some("07:00"), Some("22:00"))),
        );
        let clock = Arc::new(FixedClock::new(at("08:00:05")));
        let mut accounts = AccountRegistry::new();
        accounts.register("alice", up.clone(), clock.clone(), Watchdog::disabled());
        let accounts = Arc::new(accounts);
        let scheduler = Scheduler::new(
            store.clone(),
            accounts.clone(),
            clock.clone(),
            &SchedulerConfig::default(),
        );
        Harness {
            _dir: dir,
            store,
            up,
            clock,
            accounts,
            scheduler,
        }
    }

    fn reserve_task(strategy: Strategy) -> NewTask {
        NewTask {
            user: "alice".into(),
            name: "morning".into(),
            task_type: TaskType::Reserve,
            cron_expression: Some("0 8 * * *".into()),
            time: None,
            enabled: true,
            config: TaskConfig {
                venue_id: Some(1),
                seat_key: Some("a".into()),
                strategy,
            },
        }
    }

    fn held(key: &str) -> Reservation {
        Reservation {
            venue_id: 1,
            seat_key: key.into(),
            status: 1,
            selection_status: None,
            seat_name: None,
            date: None,
        }
    }

    fn two_free_seats() -> serde_json::Value {
        json!({"seats": [
            {"key": "a", "name": "A", "rawStatus": 1},
            {"key": "b", "name": "B", "rawStatus": 1},
        ]})
    }

    fn frequent(key: &str) -> FrequentSeat {
        FrequentSeat {
            venue_id: 1,
            seat_key: key.into(),
            label: String::new(),
        }
    }

    async fn run_tick(h: &Harness, now: &str) -> Vec<RunOutcome> {
        h.clock.set(at(now));
        let mut out = Vec::new();
        for handle in h.scheduler.tick(at(now)).unwrap() {
            out.push(handle.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn due_task_runs_exactly_once_per_day() {
        let h = harness();
        h.up.set_layout(1, json!({"seats": [{"key": "a", "name": "A", "rawStatus": 1}]}));
        h.store.create_task(reserve_task(Strategy::Custom)).unwrap();

        assert_eq!(run_tick(&h, "08:00:05").await.len(), 1);
        assert_eq!(run_tick(&h, "08:00:30").await.len(), 0);
        assert_eq!(run_tick(&h, "09:00:00").await.len(), 0);
        assert_eq!(h.up.calls("reserve"), 1);

        let task = h.store.get_task(1).unwrap();
        assert_eq!(task.last_status, Some(RunStatus::Success));
        assert_eq!(task.last_run, Some(at("08:00:05")));
    }

    /// Store whose run write-back always fails.
    struct ForgetfulStore(RedbTaskStore);

    impl TaskStore for ForgetfulStore {
        fn list_tasks(&self) -> Result<Vec<Task>> {
            self.0.list_tasks()
        }
        fn get_task(&self, id: u64) -> Result<Task> {
            self.0.get_task(id)
        }
        fn create_task(&self, new: NewTask) -> Result<Task> {
            self.0.create_task(new)
        }
        fn update_task(&self, id: u64, patch: &crate::task::TaskPatch) -> Result<Task> {
            self.0.update_task(id, patch)
        }
        fn delete_task(&self, id: u64) -> Result<()> {
            self.0.delete_task(id)
        }
        fn toggle_task(&self, id: u64) -> Result<Task> {
            self.0.toggle_task(id)
        }
        fn record_run(&self, _: u64, _: NaiveDateTime, _: RunStatus, _: &str) -> Result<Task> {
            Err(crate::error::SeatError::TaskStore("disk full".into()))
        }
    }

    #[tokio::test]
    async fn ledger_blocks_rerun_when_write_back_is_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ForgetfulStore(
            RedbTaskStore::open(&dir.path().join("tasks.redb")).unwrap(),
        ));
        let up = Arc::new(
            FakeUpstream::new().with_venue(FakeUpstream::venue(1, None, None)),
        );
        up.set_layout(1, json!({"seats": [{"key": "a", "name": "A", "rawStatus": 1}]}));
        let clock = Arc::new(FixedClock::new(at("08:00:05")));
        let mut accounts = AccountRegistry::new();
        accounts.register("alice", up.clone(), clock.clone(), Watchdog::disabled());
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(accounts),
            clock,
            &SchedulerConfig::default(),
        );
        store.create_task(reserve_task(Strategy::Custom)).unwrap();

        for now in ["08:00:05", "08:00:25", "08:00:45"] {
            for handle in scheduler.tick(at(now)).unwrap() {
                handle.await.unwrap();
            }
        }
        assert_eq!(up.calls("reserve"), 1);
        assert!(store.get_task(1).unwrap().last_run.is_none());
    }

    #[tokio::test]
    async fn default_all_books_first_available() {
        let h = harness();
        h.up.set_layout(
            1,
            json!({"seats": [
                {"key": "a", "name": "A", "rawStatus": 3},
                {"key": "b", "name": "B", "rawStatus": 1},
            ]}),
        );
        h.up.set_frequent(vec![frequent("a"), frequent("b")]);
        let task = h.store.create_task(reserve_task(Strategy::DefaultAll)).unwrap();

        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(h.up.reserved_seats(), vec![(1, "b".to_string())]);
        assert_eq!(
            h.store.get_task(task.id).unwrap().last_status,
            Some(RunStatus::Success)
        );
    }

    #[tokio::test]
    async fn default_all_with_nothing_available_records_failure() {
        let h = harness();
        h.up.set_layout(
            1,
            json!({"seats": [
                {"key": "a", "name": "A", "rawStatus": 3},
                {"key": "b", "name": "B", "rawStatus": 0},
            ]}),
        );
        h.up.set_frequent(vec![frequent("a"), frequent("b")]);
        let task = h.store.create_task(reserve_task(Strategy::DefaultAll)).unwrap();

        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert_eq!(h.up.calls("reserve"), 0);
        let stored = h.store.get_task(task.id).unwrap();
        assert_eq!(stored.last_status, Some(RunStatus::Failure));
        assert!(stored.last_message.unwrap().contains("none of 2"));
    }

    #[tokio::test]
    async fn default_all_stops_on_ban() {
        let h = harness();
        h.up.set_layout(
            1,
            json!({"seats": [
                {"key": "a", "name": "A", "rawStatus": 1},
                {"key": "b", "name": "B", "rawStatus": 1},
            ]}),
        );
        h.up.set_frequent(vec![frequent("a"), frequent("b")]);
        h.up.fail_reserve_for(
            "a",
            UpstreamError::Http {
                status: 403,
                body: r#"{"detail": "abnormal reservation behaviour"}"#.into(),
            },
        );
        let task = h.store.create_task(reserve_task(Strategy::DefaultAll)).unwrap();

        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert_eq!(h.up.calls("reserve"), 1);
    }

    #[tokio::test]
    async fn reserve_is_skipped_when_already_holding_a_seat() {
        let h = harness();
        h.up.set_reservation(Some(Reservation {
            venue_id: 1,
            seat_key: "z".into(),
            status: 1,
            selection_status: None,
            seat_name: None,
            date: None,
        }));
        let task = h.store.create_task(reserve_task(Strategy::Custom)).unwrap();
        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Skipped);
        assert_eq!(h.up.calls("reserve"), 0);
    }

    #[tokio::test]
    async fn tasks_due_together_book_one_seat() {
        let h = harness();
        h.up.set_layout(1, two_free_seats());
        h.up.on_reserve_set_reservation(held("a"));
        h.up.gate_reserve();
        h.store.create_task(reserve_task(Strategy::Custom)).unwrap();
        h.store
            .create_task(NewTask {
                config: TaskConfig {
                    venue_id: Some(1),
                    seat_key: Some("b".into()),
                    strategy: Strategy::Custom,
                },
                ..reserve_task(Strategy::Custom)
            })
            .unwrap();

        let handles = h.scheduler.tick(at("08:00:05")).unwrap();
        assert_eq!(handles.len(), 2);
        h.up.reserve_entered().await;
        h.up.release_reserve();

        let mut statuses = Vec::new();
        for handle in handles {
            statuses.push(handle.await.unwrap().status);
        }
        statuses.sort_by_key(|s| s.to_string());
        assert_eq!(statuses, vec![RunStatus::Skipped, RunStatus::Success]);
        assert_eq!(h.up.calls("reserve"), 1);

        let recorded: Vec<_> = [1, 2]
            .iter()
            .map(|id| h.store.get_task(*id).unwrap().last_status)
            .collect();
        assert!(recorded.contains(&Some(RunStatus::Success)));
        assert!(recorded.contains(&Some(RunStatus::Skipped)));
    }

    #[tokio::test]
    async fn task_queued_behind_manual_booking_sees_its_result() {
        let h = harness();
        h.up.set_layout(1, two_free_seats());
        h.up.on_reserve_set_reservation(held("b"));
        h.up.gate_reserve();
        let task = h.store.create_task(reserve_task(Strategy::Custom)).unwrap();

        let alice = h.accounts.get("alice").unwrap();
        alice.list_venues().await.unwrap();
        alice.layout(1).await.unwrap();
        let manual = tokio::spawn({
            let alice = alice.clone();
            async move { alice.book(1, "b").await }
        });
        h.up.reserve_entered().await;

        let scheduled = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.execute(&task).await }
        });
        tokio::task::yield_now().await;
        h.up.release_reserve();

        manual.await.unwrap().unwrap();
        let outcome = scheduled.await.unwrap();
        assert_eq!(outcome.status, RunStatus::Skipped);
        assert!(outcome.message.contains("seat b"));
        assert_eq!(h.up.reserved_seats(), vec![(1, "b".to_string())]);
    }

    #[tokio::test]
    async fn default_all_stops_when_a_seat_is_already_held() {
        let h = harness();
        h.up.set_layout(1, two_free_seats());
        h.up.set_frequent(vec![frequent("a"), frequent("b")]);
        let task = h.store.create_task(reserve_task(Strategy::DefaultAll)).unwrap();

        h.up.on_reserve_set_reservation(held("b"));
        h.up.gate_reserve();
        let alice = h.accounts.get("alice").unwrap();
        alice.list_venues().await.unwrap();
        alice.layout(1).await.unwrap();
        let manual = tokio::spawn({
            let alice = alice.clone();
            async move { alice.book(1, "b").await }
        });
        h.up.reserve_entered().await;
        let scheduled = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.execute(&task).await }
        });
        tokio::task::yield_now().await;
        h.up.release_reserve();

        manual.await.unwrap().unwrap();
        let outcome = scheduled.await.unwrap();
        assert_eq!(outcome.status, RunStatus::Skipped);
        assert_eq!(h.up.calls("reserve"), 1);
    }

    #[tokio::test]
    async fn signin_task_without_reservation_fails() {
        let h = harness();
        let task = h
            .store
            .create_task(NewTask {
                task_type: TaskType::Signin,
                config: TaskConfig::default(),
                ..reserve_task(Strategy::Custom)
            })
            .unwrap();
        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert_eq!(h.up.calls("sign_in"), 0);
    }

    #[tokio::test]
    async fn unknown_account_is_recorded_not_fatal() {
        let h = harness();
        let task = h
            .store
            .create_task(NewTask {
                user: "mallory".into(),
                ..reserve_task(Strategy::Custom)
            })
            .unwrap();
        let outcome = h.scheduler.execute(&task).await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.message.contains("unknown account"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let h = harness();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(h.scheduler.clone().run(async move {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_secs(45)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
