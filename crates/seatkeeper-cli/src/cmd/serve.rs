use crate::cmd::{load_config, open_accounts, runtime, venue_clock};
use anyhow::Context;
use seatkeeper_core::paths;
use seatkeeper_core::scheduler::{RedbTaskStore, Scheduler, TaskStore};
use seatkeeper_server::AppState;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// A future that resolves once Ctrl-C has been received.
fn shutdown_signal(rx: &watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    let mut rx = rx.clone();
    async move {
        loop {
            if *rx.borrow_and_update() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

fn spawn_ctrl_c(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!("could not listen for Ctrl-C: {e}"),
        }
        let _ = tx.send(true);
    });
}

fn open_store(home: &Path) -> anyhow::Result<Arc<dyn TaskStore>> {
    let path = paths::tasks_db_path(home);
    let store = RedbTaskStore::open(&path)
        .with_context(|| format!("failed to open task store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// `seatkeeper serve`: HTTP API plus (unless disabled) the scheduler loop.
pub fn run(home: &Path, port: Option<u16>, no_scheduler: bool) -> anyhow::Result<()> {
    let config = load_config(home)?;
    let port = port.unwrap_or(config.server.port);
    let store = open_store(home)?;

    let rt = runtime()?;
    rt.block_on(async move {
        let accounts = open_accounts(&config)?;
        let (tx, rx) = watch::channel(false);
        spawn_ctrl_c(tx.clone());

        let scheduler = (!no_scheduler).then(|| {
            let s = Scheduler::new(
                store.clone(),
                accounts.clone(),
                venue_clock(&config),
                &config.scheduler,
            );
            tokio::spawn(s.run(shutdown_signal(&rx)))
        });

        let state = AppState::new(accounts.clone(), store);
        let served = seatkeeper_server::serve(state, port, shutdown_signal(&rx)).await;
        // A bind failure must still stop the scheduler.
        let _ = tx.send(true);

        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                warn!("scheduler ended abnormally: {e}");
            }
        }
        accounts.shutdown_all();
        served
    })
}

/// `seatkeeper run`: the scheduler loop alone.
pub fn run_scheduler(home: &Path) -> anyhow::Result<()> {
    let config = load_config(home)?;
    let store = open_store(home)?;

    let rt = runtime()?;
    rt.block_on(async move {
        let accounts = open_accounts(&config)?;
        let (tx, rx) = watch::channel(false);
        spawn_ctrl_c(tx);

        let scheduler = Scheduler::new(
            store,
            accounts.clone(),
            venue_clock(&config),
            &config.scheduler,
        );
        scheduler.run(shutdown_signal(&rx)).await;
        accounts.shutdown_all();
        info!("stopped");
        Ok(())
    })
}
