//! Tactics: ordered collections of strikes executed as one unit.
//!
//! # State machine
//!
//! ```text
//! not_started --execute--> running --+--> completed
//!                                    |
//!                                    +--> halted_bad_state
//! ```
//!
//! A tactic executes once. Strikes run in declaration order on the calling
//! thread; the only other activity is the interrupt listener, which watches
//! the tactic's change ledger while it executes. A strike that panics is
//! recorded as failed and its tracked changes are reverted before the next
//! strike runs.

mod listener;

pub use listener::{CleanupHandle, CleanupListener, ExitPolicy, WatchGuard};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::change::ChangeLedger;
use crate::errors::{BAD_STATE_MESSAGE, TacticError};
use crate::strike::{Strike, StrikeContext, StrikeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacticStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    HaltedBadState,
}

impl std::fmt::Display for TacticStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TacticStatus::NotStarted => write!(f, "not started"),
            TacticStatus::Running => write!(f, "running"),
            TacticStatus::Completed => write!(f, "completed"),
            TacticStatus::HaltedBadState => write!(f, "halted (bad state)"),
        }
    }
}

/// Names of strikes that have already run, shared across tactics and across
/// repeated executions so a resumed run does not repeat completed strikes.
#[derive(Debug, Clone, Default)]
pub struct ExecutedStrikes {
    names: Arc<Mutex<Vec<String>>>,
}

impl ExecutedStrikes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(Mutex::new(names.into_iter().map(Into::into).collect())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|n| n == name)
    }

    pub fn record(&self, name: &str) {
        self.lock().push(name.to_string());
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Tactic {
    pub name: String,
    #[serde(default)]
    pub status: TacticStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub passed: bool,
    pub bad_state_alert: bool,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    #[serde(default)]
    pub strike_results: BTreeMap<String, StrikeResult>,
    #[serde(skip)]
    strikes: Vec<Strike>,
    #[serde(skip)]
    context: StrikeContext,
    #[serde(skip)]
    executed: ExecutedStrikes,
    #[serde(skip)]
    listen_for_signals: bool,
    #[serde(skip)]
    cleanup_handle: Option<CleanupHandle>,
}

impl Tactic {
    pub fn new(name: &str, strikes: Vec<Strike>, context: StrikeContext) -> Self {
        Self {
            name: name.to_string(),
            status: TacticStatus::NotStarted,
            start_time: None,
            end_time: None,
            passed: false,
            bad_state_alert: false,
            attempts: 0,
            successes: 0,
            failures: 0,
            strike_results: BTreeMap::new(),
            strikes,
            context,
            executed: ExecutedStrikes::new(),
            listen_for_signals: true,
            cleanup_handle: None,
        }
    }

    /// Share the executed-strike list with other tactics of the same run.
    pub fn with_executed_strikes(mut self, executed: ExecutedStrikes) -> Self {
        self.executed = executed;
        self
    }

    /// Disable the process-wide interrupt listener, for hosts that handle signals themselves.
    pub fn with_signal_listener(mut self, enabled: bool) -> Self {
        self.listen_for_signals = enabled;
        self
    }

    /// Register with this listener instead of the process-wide one.
    pub fn with_cleanup_handle(mut self, handle: CleanupHandle) -> Self {
        self.cleanup_handle = Some(handle);
        self
    }

    pub fn strikes(&self) -> &[Strike] {
        &self.strikes
    }

    pub fn executed_strikes(&self) -> &ExecutedStrikes {
        &self.executed
    }

    /// Run every strike in order.
    ///
    /// A strike is skipped when its name was executed before this call. The
    /// loop halts as soon as a strike's follow-through reports bad state.
    /// Afterwards every change is reverted once more, including changes of a
    /// strike that never returned a result.
    pub fn execute(&mut self) -> Result<(), TacticError> {
        if self.name.is_empty() {
            return Err(TacticError::NameUnset);
        }
        if self.status != TacticStatus::NotStarted {
            return Err(TacticError::AlreadyExecuted {
                name: self.name.clone(),
            });
        }

        let ledger = ChangeLedger::new();
        let ctx = self.context.clone().with_ledger(ledger.clone());
        let handle = match &self.cleanup_handle {
            Some(handle) => Some(handle.clone()),
            None if self.listen_for_signals => CleanupListener::process_handle(),
            None => None,
        };
        let watch = handle.map(|h| h.watch(&self.name, ledger.clone()));

        self.status = TacticStatus::Running;
        self.start_time = Some(Utc::now());
        info!(tactic = %self.name, strikes = self.strikes.len(), "executing tactic");

        // Only names recorded before this call count; identical names inside
        // one tactic all run, and the later result replaces the earlier one.
        let previously_executed = self.executed.names();
        let strikes = std::mem::take(&mut self.strikes);
        for strike in &strikes {
            if self.bad_state_alert {
                error!(tactic = %self.name, "halting remaining strikes after bad state");
                break;
            }
            // Skip and keep going rather than stopping at the first executed
            // name, so a resumed run still reaches the strikes after it.
            if previously_executed.iter().any(|n| n == strike.name()) {
                info!(tactic = %self.name, strike = strike.name(), "skipping already executed strike");
                continue;
            }
            self.run_strike(strike, &ctx);
        }
        self.strikes = strikes;

        self.cleanup(&ledger);
        drop(watch);

        self.end_time = Some(Utc::now());
        self.status = if self.bad_state_alert {
            TacticStatus::HaltedBadState
        } else {
            TacticStatus::Completed
        };
        self.passed = !self.bad_state_alert && self.failures == 0;

        if self.bad_state_alert {
            error!(tactic = %self.name, "tactic ended in bad state");
            return Err(TacticError::BadState {
                name: self.name.clone(),
            });
        }
        if self.failures > 0 {
            warn!(
                tactic = %self.name,
                succeeded = self.successes,
                attempted = self.attempts,
                "tactic completed with failed strikes"
            );
            return Err(TacticError::StrikesFailed {
                name: self.name.clone(),
                succeeded: self.successes,
                attempted: self.attempts,
            });
        }
        info!(tactic = %self.name, attempted = self.attempts, "tactic passed");
        Ok(())
    }

    fn run_strike(&mut self, strike: &Strike, ctx: &StrikeContext) {
        self.attempts += 1;
        let (name, mut result) = match panic::catch_unwind(AssertUnwindSafe(|| strike.run(ctx))) {
            Ok(ran) => ran,
            Err(payload) => (
                strike.name().to_string(),
                panicked_result(strike.name(), &*payload, ctx.ledger()),
            ),
        };
        result.follow_through();
        self.bad_state_alert = result.bad_state_alert;

        if result.passed {
            self.successes += 1;
            info!(tactic = %self.name, strike = %name, "strike passed");
        } else {
            self.failures += 1;
            warn!(tactic = %self.name, strike = %name, message = %result.message, "strike failed");
        }

        self.executed.record(&name);
        self.strike_results.insert(name, result);
    }

    /// Revert every change again. Already reverted changes are untouched, so
    /// this only does work for changes a strike failed to hand back.
    fn cleanup(&mut self, ledger: &ChangeLedger) {
        for result in self.strike_results.values_mut() {
            result.follow_through();
        }
        let leftover_failures = ledger.revert_all();
        self.bad_state_alert = !leftover_failures.is_empty()
            || self.strike_results.values().any(|r| r.bad_state_alert);
    }
}

/// A failed result for a strike that panicked. Changes it tracked before the
/// panic are reverted right away; a change that will not revert is bad state.
fn panicked_result(name: &str, payload: &(dyn Any + Send), ledger: &ChangeLedger) -> StrikeResult {
    let mut result = StrikeResult::new(name);
    result.message = format!("Strike panicked: {}", panic_message(payload));
    error!(strike = name, message = %result.message, "strike panicked; reverting its changes");
    if !ledger.revert_all().is_empty() {
        result.bad_state_alert = true;
        result.message = BAD_STATE_MESSAGE.to_string();
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
