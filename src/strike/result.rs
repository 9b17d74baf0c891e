//! Result aggregation for a single strike.
//!
//! Movements are folded into the strike with a worst-case-wins policy: once
//! the strike has failed it stays failed. Follow-through then reverts every
//! change the movements created, and a change that cannot be reverted raises
//! the bad-state alert, which overrides any pass or fail message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::MovementResult;
use crate::change::{Change, ChangeLedger};
use crate::errors::{BAD_STATE_MESSAGE, ChangeError};

/// Message given to a strike whose movements never reported anything.
pub const NOT_IMPLEMENTED_MESSAGE: &str =
    "Strike did not return a result and may not be implemented yet";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrikeResult {
    pub passed: bool,
    pub description: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docs_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub control_id: String,
    #[serde(default)]
    pub movements: BTreeMap<String, MovementResult>,
    #[serde(default)]
    pub bad_state_alert: bool,
    #[serde(skip)]
    invasive: bool,
    #[serde(skip)]
    ledger: Option<ChangeLedger>,
}

impl StrikeResult {
    /// A standalone result. Invasive movements are skipped unless the result
    /// comes from a `StrikeContext` that allows them.
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn for_context(description: &str, invasive: bool, ledger: ChangeLedger) -> Self {
        Self {
            description: description.to_string(),
            invasive,
            ledger: Some(ledger),
            ..Self::default()
        }
    }

    pub fn with_control_id(mut self, control_id: &str) -> Self {
        self.control_id = control_id.to_string();
        self
    }

    pub fn with_docs_url(mut self, docs_url: &str) -> Self {
        self.docs_url = docs_url.to_string();
        self
    }

    pub fn invasive(&self) -> bool {
        self.invasive
    }

    /// Run a movement and fold its result into this strike.
    pub fn execute_movement<F>(&mut self, name: &str, movement: F)
    where
        F: FnOnce() -> MovementResult,
    {
        let mut result = movement();
        result.function_name = name.to_string();
        if let Some(ledger) = &self.ledger {
            for change in result.changes.values() {
                ledger.track(change);
            }
        }
        debug!(
            movement = name,
            passed = result.passed,
            message = %result.message,
            "movement finished"
        );
        self.record(name, result);
    }

    /// Run a movement only when invasive checks are enabled; otherwise the
    /// strike is left untouched.
    pub fn execute_invasive_movement<F>(&mut self, name: &str, movement: F)
    where
        F: FnOnce() -> MovementResult,
    {
        if !self.invasive {
            trace!(movement = name, "skipping invasive movement");
            return;
        }
        self.execute_movement(name, movement);
    }

    fn record(&mut self, name: &str, result: MovementResult) {
        if self.movements.is_empty() || self.passed {
            self.passed = result.passed;
            self.message = result.message.clone();
        } else if !result.passed {
            // The strike stays failed; the latest failure's message is shown.
            self.message = result.message.clone();
        }
        self.movements.insert(name.to_string(), result);
    }

    /// Every change created by every movement of this strike.
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.movements.values().flat_map(|m| m.changes.values())
    }

    /// Revert every change of this strike, attempting all of them.
    pub fn revert_changes(&self) -> Vec<ChangeError> {
        let mut failures = Vec::new();
        for change in self.changes() {
            if let Err(e) = change.revert() {
                error!(change = change.name(), error = %e, "failed to revert change");
                failures.push(e);
            }
        }
        failures
    }

    /// Finish the strike: default the message, revert every change regardless
    /// of outcome, and raise the bad-state alert if any revert failed.
    ///
    /// Safe to call more than once; reverted changes are not touched again.
    pub fn follow_through(&mut self) {
        if self.message.is_empty() {
            self.message = NOT_IMPLEMENTED_MESSAGE.to_string();
        }
        if !self.revert_changes().is_empty() {
            self.bad_state_alert = true;
            self.message = BAD_STATE_MESSAGE.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn passing(msg: &str) -> MovementResult {
        MovementResult::new("passes").pass(msg)
    }

    fn failing(msg: &str) -> MovementResult {
        MovementResult::new("fails").fail(msg)
    }

    fn applied_change(name: &str, revert_ok: bool) -> Change {
        let change = Change::new(
            name,
            "test change",
            |_, _| Ok(Value::Null),
            move |_| {
                if revert_ok {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("revert refused"))
                }
            },
        );
        change.apply("target", &Value::Null).unwrap();
        change
    }

    #[test]
    fn test_first_movement_sets_outcome() {
        let mut strike = StrikeResult::new("s");
        strike.execute_movement("m1", || passing("all good"));
        assert!(strike.passed);
        assert_eq!(strike.message, "all good");
        assert_eq!(strike.movements["m1"].function_name, "m1");
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut strike = StrikeResult::new("s");
        strike.execute_movement("m1", || passing("ok"));
        strike.execute_movement("m2", || failing("broken"));
        strike.execute_movement("m3", || passing("ok again"));

        assert!(!strike.passed);
        assert_eq!(strike.message, "broken");
        assert_eq!(strike.movements.len(), 3);
    }

    #[test]
    fn test_later_failure_replaces_message() {
        let mut strike = StrikeResult::new("s");
        strike.execute_movement("m1", || failing("first failure"));
        strike.execute_movement("m2", || failing("second failure"));

        assert!(!strike.passed);
        assert_eq!(strike.message, "second failure");
    }

    #[test]
    fn test_invasive_movement_skipped_when_not_invasive() {
        let mut strike = StrikeResult::new("s");
        strike.execute_movement("m1", || passing("baseline"));
        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = ran.clone();

        strike.execute_invasive_movement("m2", move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            failing("would mutate")
        });

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(strike.movements.len(), 1);
        assert!(strike.passed);
        assert_eq!(strike.message, "baseline");
    }

    #[test]
    fn test_invasive_movement_runs_when_invasive() {
        let mut strike = StrikeResult::for_context("s", true, ChangeLedger::new());
        strike.execute_invasive_movement("m1", || passing("mutated and verified"));
        assert!(strike.passed);
        assert!(strike.movements.contains_key("m1"));
    }

    #[test]
    fn test_follow_through_defaults_message() {
        let mut strike = StrikeResult::new("s");
        strike.follow_through();
        assert_eq!(strike.message, NOT_IMPLEMENTED_MESSAGE);
        assert!(!strike.passed);
        assert!(!strike.bad_state_alert);
    }

    #[test]
    fn test_follow_through_reverts_changes_of_passing_strike() {
        let change = applied_change("c1", true);
        let mut strike = StrikeResult::new("s");
        let movement_change = change.clone();
        strike.execute_movement("m1", move || passing("ok").with_change("c1", movement_change));

        strike.follow_through();

        assert!(change.reverted());
        assert!(strike.passed);
        assert_eq!(strike.message, "ok");
        assert!(!strike.bad_state_alert);
    }

    #[test]
    fn test_follow_through_bad_state_overrides_message() {
        let stuck = applied_change("stuck", false);
        let fine = applied_change("fine", true);
        let mut strike = StrikeResult::new("s");
        let (a, b) = (stuck.clone(), fine.clone());
        strike.execute_movement("m1", move || {
            passing("ok").with_change("stuck", a).with_change("fine", b)
        });

        strike.follow_through();

        assert!(strike.bad_state_alert);
        assert_eq!(strike.message, BAD_STATE_MESSAGE);
        assert!(fine.reverted());
        assert!(stuck.bad_state());
    }

    #[test]
    fn test_follow_through_twice_has_no_new_side_effects() {
        let reverts = Arc::new(AtomicU32::new(0));
        let reverts_clone = reverts.clone();
        let change = Change::new(
            "c1",
            "counted",
            |_, _| Ok(Value::Null),
            move |_| {
                reverts_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        change.apply("t", &Value::Null).unwrap();
        let mut strike = StrikeResult::new("s");
        let movement_change = change.clone();
        strike.execute_movement("m1", move || failing("nope").with_change("c1", movement_change));

        strike.follow_through();
        let message = strike.message.clone();
        strike.follow_through();

        assert_eq!(reverts.load(Ordering::SeqCst), 1);
        assert_eq!(strike.message, message);
        assert!(!strike.bad_state_alert);
    }

    #[test]
    fn test_movement_changes_are_tracked_in_ledger() {
        let ledger = ChangeLedger::new();
        let mut strike = StrikeResult::for_context("s", false, ledger.clone());
        let change = applied_change("c1", true);
        let movement_change = change.clone();
        strike.execute_movement("m1", move || passing("ok").with_change("c1", movement_change));

        assert_eq!(ledger.len(), 1);
        assert!(ledger.changes()[0].same_as(&change));
    }
}
