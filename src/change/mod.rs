//! Reversible mutations against a target service.
//!
//! A `Change` pairs an apply function with a revert function and records
//! which of the two has run. Handles are cheap to clone: every clone points at
//! the same state, so the strike loop and the interrupt listener observe the
//! same `applied`/`reverted` flags.
//!
//! Each transition runs while holding the change's own lock. A revert issued
//! from the interrupt listener therefore waits for an in-flight apply to
//! finish and then undoes it, instead of racing past it.
//!
//! # Lifecycle
//!
//! ```text
//! fresh --apply ok--> applied --revert ok--> applied+reverted --apply ok--> applied
//!   |                   |
//!   apply err           revert err
//!   v                   v
//! bad state (inert: every further apply/revert fails fast)
//! ```

pub mod ledger;
pub mod manager;

pub use ledger::ChangeLedger;
pub use manager::ChangeManager;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::ChangeError;

/// Applies a change. Receives the target name and caller input, returns the
/// object that was mutated so the revert function can find it again.
pub type ApplyFn = Arc<dyn Fn(&str, &Value) -> anyhow::Result<Value> + Send + Sync>;

/// Undoes a change, given the object returned by the apply function.
pub type RevertFn = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct ChangeState {
    applied: bool,
    reverted: bool,
    bad_state: bool,
    last_error: Option<ChangeError>,
    target: Option<Value>,
}

struct ChangeInner {
    name: String,
    description: String,
    apply: Option<ApplyFn>,
    revert: Option<RevertFn>,
    state: Mutex<ChangeState>,
}

/// A named, reversible mutation.
#[derive(Clone)]
pub struct Change {
    inner: Arc<ChangeInner>,
}

impl Change {
    /// Create a change with both functions set.
    pub fn new<A, R>(name: &str, description: &str, apply: A, revert: R) -> Self
    where
        A: Fn(&str, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
        R: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::builder(name)
            .description(description)
            .apply(apply)
            .revert(revert)
            .build()
    }

    pub fn builder(name: &str) -> ChangeBuilder {
        ChangeBuilder {
            name: name.to_string(),
            description: String::new(),
            apply: None,
            revert: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn applied(&self) -> bool {
        self.lock().applied
    }

    pub fn reverted(&self) -> bool {
        self.lock().reverted
    }

    pub fn bad_state(&self) -> bool {
        self.lock().bad_state
    }

    pub fn last_error(&self) -> Option<ChangeError> {
        self.lock().last_error.clone()
    }

    /// The object returned by the most recent successful apply.
    pub fn target(&self) -> Option<Value> {
        self.lock().target.clone()
    }

    /// Whether two handles refer to the same change.
    pub fn same_as(&self, other: &Change) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Apply the change.
    ///
    /// Applying a change that is live (applied and not reverted) does not call
    /// the apply function again; it returns the previously recorded target.
    /// A failed apply puts the change in bad state permanently.
    pub fn apply(&self, target_name: &str, input: &Value) -> Result<Value, ChangeError> {
        let mut state = self.lock();
        self.precheck(&mut state)?;

        if state.applied && !state.reverted {
            return Ok(state.target.clone().unwrap_or(Value::Null));
        }

        let Some(apply) = self.inner.apply.as_ref() else {
            return Err(ChangeError::MissingApply {
                name: self.inner.name.clone(),
            });
        };

        match apply(target_name, input) {
            Ok(target) => {
                state.applied = true;
                state.reverted = false;
                state.target = Some(target.clone());
                Ok(target)
            }
            Err(e) => {
                let err = ChangeError::ApplyFailed {
                    name: self.inner.name.clone(),
                    reason: format!("{e:#}"),
                };
                state.bad_state = true;
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Revert the change.
    ///
    /// A change that was never applied, or is already reverted, is left alone.
    /// `reverted` is layered on top of `applied`; a later apply clears it.
    pub fn revert(&self) -> Result<(), ChangeError> {
        let mut state = self.lock();
        if state.bad_state {
            return Err(self.inert_error(&state));
        }
        if !state.applied || state.reverted {
            return Ok(());
        }

        let Some(revert) = self.inner.revert.as_ref() else {
            let err = ChangeError::MissingRevert {
                name: self.inner.name.clone(),
            };
            state.bad_state = true;
            state.last_error = Some(err.clone());
            return Err(err);
        };

        let target = state.target.clone().unwrap_or(Value::Null);
        match revert(&target) {
            Ok(()) => {
                state.reverted = true;
                Ok(())
            }
            Err(e) => {
                let err = ChangeError::RevertFailed {
                    name: self.inner.name.clone(),
                    reason: format!("{e:#}"),
                };
                state.bad_state = true;
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Fails when either function is missing, name or description is empty,
    /// or an unrecoverable error was recorded earlier. The failure is kept on
    /// the change as `last_error`.
    fn precheck(&self, state: &mut ChangeState) -> Result<(), ChangeError> {
        if state.bad_state {
            return Err(self.inert_error(state));
        }

        let name = &self.inner.name;
        let err = if name.is_empty() {
            Some(ChangeError::MissingName)
        } else if self.inner.description.is_empty() {
            Some(ChangeError::MissingDescription { name: name.clone() })
        } else if self.inner.apply.is_none() {
            Some(ChangeError::MissingApply { name: name.clone() })
        } else if self.inner.revert.is_none() {
            Some(ChangeError::MissingRevert { name: name.clone() })
        } else {
            None
        };

        match err {
            Some(err) => {
                state.last_error = Some(err.clone());
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn inert_error(&self, state: &ChangeState) -> ChangeError {
        ChangeError::Inert {
            name: self.inner.name.clone(),
            reason: state
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChangeState> {
        // A panic inside a check must not make the change unrevertable.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> ChangeRecord {
        let state = self.lock();
        ChangeRecord {
            name: self.inner.name.clone(),
            description: self.inner.description.clone(),
            applied: state.applied,
            reverted: state.reverted,
            bad_state: state.bad_state,
            error: state.last_error.as_ref().map(ToString::to_string),
        }
    }
}

impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Change")
            .field("name", &self.inner.name)
            .field("applied", &state.applied)
            .field("reverted", &state.reverted)
            .field("bad_state", &state.bad_state)
            .finish_non_exhaustive()
    }
}

/// Builder for `Change`. Missing pieces are caught by the precheck on apply,
/// not at build time.
pub struct ChangeBuilder {
    name: String,
    description: String,
    apply: Option<ApplyFn>,
    revert: Option<RevertFn>,
}

impl ChangeBuilder {
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn apply<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.apply = Some(Arc::new(f));
        self
    }

    pub fn revert<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.revert = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Change {
        Change {
            inner: Arc::new(ChangeInner {
                name: self.name,
                description: self.description,
                apply: self.apply,
                revert: self.revert,
                state: Mutex::new(ChangeState::default()),
            }),
        }
    }
}

/// Persisted view of a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChangeRecord {
    name: String,
    #[serde(default)]
    description: String,
    applied: bool,
    reverted: bool,
    #[serde(default)]
    bad_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Serialize for Change {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

/// Loading a persisted change yields a record with its flags restored but no
/// functions attached; it can be inspected, not re-applied.
impl<'de> Deserialize<'de> for Change {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = ChangeRecord::deserialize(deserializer)?;
        let last_error = record.error.map(|reason| ChangeError::Inert {
            name: record.name.clone(),
            reason,
        });
        Ok(Change {
            inner: Arc::new(ChangeInner {
                name: record.name,
                description: record.description,
                apply: None,
                revert: None,
                state: Mutex::new(ChangeState {
                    applied: record.applied,
                    reverted: record.reverted,
                    bad_state: record.bad_state,
                    last_error,
                    target: None,
                }),
            }),
        })
    }
}
