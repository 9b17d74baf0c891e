use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::{Change, ChangeManager};

/// Outcome of one movement inside a strike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementResult {
    pub passed: bool,
    pub description: String,
    pub message: String,
    /// Name the movement was registered under.
    #[serde(default)]
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, Change>,
}

impl MovementResult {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Self::default()
        }
    }

    pub fn pass(mut self, message: &str) -> Self {
        self.passed = true;
        self.message = message.to_string();
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.passed = false;
        self.message = message.to_string();
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn with_change(mut self, name: &str, change: Change) -> Self {
        self.changes.insert(name.to_string(), change);
        self
    }

    /// Attach every change registered with `manager`.
    pub fn with_changes_from(mut self, manager: &ChangeManager) -> Self {
        for (name, change) in manager.changes() {
            self.changes.insert(name.clone(), change.clone());
        }
        self
    }
}
