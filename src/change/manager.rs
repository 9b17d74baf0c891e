//! Named collection of changes for one unit of work.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{Change, ChangeLedger};
use crate::errors::ChangeError;

/// Owns the changes of one strike or movement.
///
/// `allowed` gates applying only. Reverting is always permitted so cleanup
/// can run after further harm has been forbidden. `bad_state` is sticky for
/// the lifetime of the manager.
#[derive(Debug, Default)]
pub struct ChangeManager {
    changes: BTreeMap<String, Change>,
    allowed: bool,
    bad_state: bool,
    ledger: Option<ChangeLedger>,
}

impl ChangeManager {
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed,
            ..Self::default()
        }
    }

    /// A manager whose changes are also recorded in `ledger`.
    pub fn with_ledger(allowed: bool, ledger: ChangeLedger) -> Self {
        Self {
            allowed,
            ledger: Some(ledger),
            ..Self::default()
        }
    }

    pub fn allow(&mut self) {
        self.allowed = true;
    }

    pub fn forbid(&mut self) {
        self.allowed = false;
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn bad_state(&self) -> bool {
        self.bad_state
    }

    /// Register a change under `name`, replacing any earlier registration.
    pub fn add(&mut self, name: &str, change: Change) {
        if let Some(ledger) = &self.ledger {
            ledger.track(&change);
        }
        if self.changes.insert(name.to_string(), change).is_some() {
            debug!(change = name, "replaced existing change registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Change> {
        self.changes.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    pub fn changes(&self) -> &BTreeMap<String, Change> {
        &self.changes
    }

    pub fn into_changes(self) -> BTreeMap<String, Change> {
        self.changes
    }

    /// Apply the change registered under `name` against `target_name`.
    ///
    /// Returns `None` without touching anything when the manager is not
    /// allowed to apply or the name is unknown. A precheck or apply failure
    /// also returns `None`; the error stays on the change.
    pub fn apply(&mut self, name: &str, target_name: &str, input: &Value) -> Option<Value> {
        if !self.allowed {
            trace!(change = name, "change manager is not allowed to apply changes");
            return None;
        }
        let change = self.changes.get(name)?;

        match change.apply(target_name, input) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!(change = name, error = %e, "change was not applied");
                if e.is_bad_state() {
                    self.bad_state = true;
                }
                None
            }
        }
    }

    /// Revert the change registered under `name`. Unknown names are ignored.
    pub fn revert(&mut self, name: &str) -> Result<(), ChangeError> {
        let Some(change) = self.changes.get(name) else {
            return Ok(());
        };
        let result = change.revert();
        if result.is_err() {
            self.bad_state = true;
        }
        result
    }

    /// Revert every registered change, continuing past failures.
    pub fn revert_all(&mut self) -> Vec<ChangeError> {
        let mut failures = Vec::new();
        for change in self.changes.values() {
            if let Err(e) = change.revert() {
                failures.push(e);
            }
        }
        if !failures.is_empty() {
            self.bad_state = true;
        }
        failures
    }
}
