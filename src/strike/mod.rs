//! Strikes: named checks made of one or more movements.
//!
//! A strike body receives a `StrikeContext` and returns a `StrikeResult`.
//! The context carries the execution settings (service, invasive flag, vars)
//! explicitly, so two runs with different settings never share state.
//!
//! ```ignore
//! let strike = Strike::new("bucket_is_private", |ctx| {
//!     let mut result = ctx.strike_result("Bucket rejects anonymous reads")
//!         .with_control_id("CCC.ObjStor.C01");
//!     result.execute_movement("anonymous_read", || check_anonymous_read(ctx));
//!     result
//! });
//! ```

mod movement;
mod result;

pub use movement::MovementResult;
pub use result::{NOT_IMPLEMENTED_MESSAGE, StrikeResult};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::change::{ChangeLedger, ChangeManager};

/// Settings and shared state handed to every strike body.
#[derive(Debug, Clone, Default)]
pub struct StrikeContext {
    service_name: String,
    invasive: bool,
    vars: BTreeMap<String, String>,
    ledger: ChangeLedger,
}

impl StrikeContext {
    pub fn new(service_name: &str, invasive: bool) -> Self {
        Self {
            service_name: service_name.to_string(),
            invasive,
            ..Self::default()
        }
    }

    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub(crate) fn with_ledger(mut self, ledger: ChangeLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn invasive(&self) -> bool {
        self.invasive
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// A fresh result wired to this context's invasive flag and ledger.
    pub fn strike_result(&self, description: &str) -> StrikeResult {
        StrikeResult::for_context(description, self.invasive, self.ledger.clone())
    }

    /// A change manager that may apply changes only when invasive checks are
    /// enabled. Changes added to it are tracked for interrupt cleanup.
    pub fn change_manager(&self) -> ChangeManager {
        ChangeManager::with_ledger(self.invasive, self.ledger.clone())
    }
}

pub type StrikeFn = Arc<dyn Fn(&StrikeContext) -> StrikeResult + Send + Sync>;

/// A named check registered with an armory.
#[derive(Clone)]
pub struct Strike {
    name: String,
    run: StrikeFn,
}

impl Strike {
    pub fn new<F>(name: &str, run: F) -> Self
    where
        F: Fn(&StrikeContext) -> StrikeResult + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, ctx: &StrikeContext) -> (String, StrikeResult) {
        (self.name.clone(), (self.run)(ctx))
    }
}

impl fmt::Debug for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strike").field("name", &self.name).finish()
    }
}
