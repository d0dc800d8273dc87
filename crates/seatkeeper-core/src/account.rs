//! One booking orchestrator per configured account.

use crate::booking::BookingOrchestrator;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Result, SeatError};
use crate::flight::SingleFlight;
use crate::upstream::Upstream;
use crate::watchdog::Watchdog;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<String, Arc<BookingOrchestrator>>,
    flight: SingleFlight,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `config`, asking `connect` for each account's
    /// upstream session.
    pub fn from_config<F>(config: &Config, clock: Arc<dyn Clock>, mut connect: F) -> Result<Self>
    where
        F: FnMut(&str, String) -> Result<Arc<dyn Upstream>>,
    {
        let mut registry = Self::new();
        for account in &config.accounts {
            crate::paths::validate_user(&account.user)?;
            let token = account.resolve_token()?;
            let upstream = connect(&account.user, token)?;
            let watchdog = Watchdog::new(config.watchdog.delay(), config.watchdog.enabled);
            registry.register(&account.user, upstream, clock.clone(), watchdog);
        }
        info!(accounts = registry.len(), "accounts loaded");
        Ok(registry)
    }

    /// Add or replace an account. All accounts share one single-flight map.
    pub fn register(
        &mut self,
        user: &str,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
        watchdog: Watchdog,
    ) -> Arc<BookingOrchestrator> {
        let orchestrator =
            BookingOrchestrator::new(user, upstream, clock, self.flight.clone(), watchdog);
        if let Some(old) = self.accounts.insert(user.to_string(), orchestrator.clone()) {
            old.shutdown();
        }
        orchestrator
    }

    pub fn get(&self, user: &str) -> Result<Arc<BookingOrchestrator>> {
        self.accounts
            .get(user)
            .cloned()
            .ok_or_else(|| SeatError::UnknownAccount(user.to_string()))
    }

    pub fn users(&self) -> Vec<&str> {
        self.accounts.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Tear down every pending watchdog timer.
    pub fn shutdown_all(&self) {
        for o in self.accounts.values() {
            o.shutdown();
        }
    }
}
