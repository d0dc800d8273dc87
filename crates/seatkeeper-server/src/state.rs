use seatkeeper_core::account::AccountRegistry;
use seatkeeper_core::booking::BookingOrchestrator;
use seatkeeper_core::scheduler::TaskStore;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountRegistry>,
    pub store: Arc<dyn TaskStore>,
}

impl AppState {
    pub fn new(accounts: Arc<AccountRegistry>, store: Arc<dyn TaskStore>) -> Self {
        Self { accounts, store }
    }

    /// The orchestrator for `user`, or `UnknownAccount`.
    pub fn account(&self, user: &str) -> seatkeeper_core::Result<Arc<BookingOrchestrator>> {
        self.accounts.get(user)
    }
}
