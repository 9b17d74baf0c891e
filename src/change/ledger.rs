//! Shared registry of every change touched during a tactic run.
//!
//! The ledger is what the interrupt listener walks when the process is asked
//! to terminate. Changes are recorded as soon as they are registered, so the
//! changes of a strike that is still running are covered too.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use super::Change;
use crate::errors::ChangeError;

#[derive(Debug, Clone, Default)]
pub struct ChangeLedger {
    changes: Arc<Mutex<Vec<Change>>>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. Recording the same change twice is a no-op.
    pub fn track(&self, change: &Change) {
        let mut changes = self.lock();
        if !changes.iter().any(|c| c.same_as(change)) {
            debug!(change = change.name(), "tracking change");
            changes.push(change.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the tracked changes, in registration order.
    pub fn changes(&self) -> Vec<Change> {
        self.lock().clone()
    }

    /// Revert every tracked change, attempting all of them even when some fail.
    ///
    /// Returns the errors of the changes that could not be reverted; an empty
    /// vector means the target is back in its original state.
    pub fn revert_all(&self) -> Vec<ChangeError> {
        // Revert outside the ledger lock so new registrations are not blocked
        // behind a slow revert function.
        let changes = self.changes();
        let mut failures = Vec::new();
        for change in changes {
            if let Err(e) = change.revert() {
                error!(change = change.name(), error = %e, "change could not be reverted");
                failures.push(e);
            }
        }
        failures
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Change>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
