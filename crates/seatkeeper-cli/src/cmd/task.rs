use crate::cmd::pick_user;
use crate::output::{or_dash, print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use seatkeeper_core::config::Config;
use seatkeeper_core::paths;
use seatkeeper_core::scheduler::{RedbTaskStore, TaskStore};
use seatkeeper_core::task::{NewTask, Strategy, Task, TaskConfig, TaskPatch, TaskType};
use seatkeeper_core::types::VenueId;
use seatkeeper_core::SeatError;
use std::path::Path;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List tasks (all accounts unless --user is given)
    List,

    /// Add a daily task
    Add {
        /// Display name
        name: String,
        /// reserve or signin
        #[arg(long = "type", value_name = "TYPE")]
        task_type: String,
        /// Wall-clock trigger time, HH:MM
        #[arg(long, conflicts_with = "cron")]
        time: Option<String>,
        /// Daily cron expression, "M H * * *"
        #[arg(long)]
        cron: Option<String>,
        /// Venue for a custom reserve task
        #[arg(long)]
        venue: Option<VenueId>,
        /// Seat key for a custom reserve task
        #[arg(long)]
        seat: Option<String>,
        /// custom or default_all
        #[arg(long)]
        strategy: Option<String>,
        /// Create the task disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change fields of a task
    Edit {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type", value_name = "TYPE")]
        task_type: Option<String>,
        #[arg(long, conflicts_with = "cron")]
        time: Option<String>,
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        venue: Option<VenueId>,
        #[arg(long)]
        seat: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Delete a task
    Delete { id: u64 },

    /// Enable a disabled task, or disable an enabled one
    Toggle { id: u64 },
}

pub fn run(
    home: &Path,
    user: Option<&str>,
    subcmd: TaskSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let path = paths::tasks_db_path(home);
    let store = RedbTaskStore::open(&path)
        .with_context(|| format!("failed to open task store {}", path.display()))?;

    match subcmd {
        TaskSubcommand::List => list(&store, user, json),
        TaskSubcommand::Add {
            name,
            task_type,
            time,
            cron,
            venue,
            seat,
            strategy,
            disabled,
        } => {
            let owner = owner(home, user)?;
            let config = TaskConfig {
                venue_id: venue,
                seat_key: seat,
                strategy: strategy
                    .as_deref()
                    .map(parse_strategy)
                    .transpose()?
                    .unwrap_or_else(|| default_strategy(venue)),
            };
            let new = NewTask {
                user: owner,
                name,
                task_type: parse_task_type(&task_type)?,
                cron_expression: cron,
                time,
                enabled: !disabled,
                config,
            };
            let task = store.create_task(new)?;
            report(&task, "created", json)
        }
        TaskSubcommand::Edit {
            id,
            name,
            task_type,
            time,
            cron,
            venue,
            seat,
            strategy,
        } => {
            let current = store.get_task(id)?;
            let config = if venue.is_some() || seat.is_some() || strategy.is_some() {
                Some(TaskConfig {
                    venue_id: venue.or(current.config.venue_id),
                    seat_key: seat.or(current.config.seat_key.clone()),
                    strategy: match strategy.as_deref() {
                        Some(s) => parse_strategy(s)?,
                        None => current.config.strategy,
                    },
                })
            } else {
                None
            };
            let patch = TaskPatch {
                name,
                task_type: task_type.as_deref().map(parse_task_type).transpose()?,
                cron_expression: cron,
                time,
                enabled: None,
                config,
            };
            let task = store.update_task(id, &patch)?;
            report(&task, "updated", json)
        }
        TaskSubcommand::Delete { id } => {
            store.delete_task(id)?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))
            } else {
                println!("Deleted task {id}.");
                Ok(())
            }
        }
        TaskSubcommand::Toggle { id } => {
            let task = store.toggle_task(id)?;
            let verb = if task.enabled { "enabled" } else { "disabled" };
            report(&task, verb, json)
        }
    }
}

/// Owner for a new task: `--user`, else the only configured account.
fn owner(home: &Path, user: Option<&str>) -> anyhow::Result<String> {
    match Config::load(home) {
        Ok(config) => pick_user(&config, user),
        Err(SeatError::NotConfigured) => {
            let Some(u) = user else {
                bail!("pass --user or run 'seatkeeper config init' first");
            };
            paths::validate_user(u)?;
            Ok(u.to_string())
        }
        Err(e) => Err(e).context("failed to load config"),
    }
}

fn default_strategy(venue: Option<VenueId>) -> Strategy {
    if venue.is_some() {
        Strategy::Custom
    } else {
        Strategy::DefaultAll
    }
}

fn parse_task_type(s: &str) -> anyhow::Result<TaskType> {
    match s {
        "reserve" | "seat_today" | "seat_tomorrow" => Ok(TaskType::Reserve),
        "signin" | "sign-in" => Ok(TaskType::Signin),
        other => bail!("unknown task type '{other}': use reserve or signin"),
    }
}

fn parse_strategy(s: &str) -> anyhow::Result<Strategy> {
    match s {
        "custom" => Ok(Strategy::Custom),
        "default_all" | "default-all" => Ok(Strategy::DefaultAll),
        other => bail!("unknown strategy '{other}': use custom or default_all"),
    }
}

fn report(task: &Task, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(task);
    }
    println!(
        "Task {} {verb}: {} ({}, daily at {})",
        task.id,
        task.name,
        task.task_type,
        task.trigger()
            .map(|t| t.to_string())
            .unwrap_or_else(|_| task.cron_expression.clone())
    );
    Ok(())
}

fn list(store: &dyn TaskStore, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    let tasks = match user {
        Some(u) => store.tasks_for(u)?,
        None => store.list_tasks()?,
    };
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    let rows = tasks
        .iter()
        .map(|t| {
            let target = match (t.task_type, t.config.strategy) {
                (TaskType::Signin, _) => "-".to_string(),
                (TaskType::Reserve, Strategy::DefaultAll) => "frequent seats".to_string(),
                (TaskType::Reserve, Strategy::Custom) => format!(
                    "{}/{}",
                    or_dash(t.config.venue_id),
                    or_dash(t.config.seat_key.as_deref())
                ),
            };
            vec![
                t.id.to_string(),
                t.user.clone(),
                t.name.clone(),
                t.task_type.to_string(),
                t.cron_expression.clone(),
                target,
                if t.enabled { "yes" } else { "no" }.to_string(),
                or_dash(t.last_status),
                or_dash(t.last_run.map(|r| r.format("%Y-%m-%d %H:%M"))),
            ]
        })
        .collect();
    print_table(
        &[
            "ID", "USER", "NAME", "TYPE", "CRON", "TARGET", "ENABLED", "LAST", "LAST RUN",
        ],
        rows,
    );
    Ok(())
}
