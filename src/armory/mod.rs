//! Armories: named tactics and the ordered strikes each one runs.
//!
//! - `Armory` maps a tactic name to its strikes, in registration order
//! - `filesystem` provides the built-in armory used by the `raidengine` binary

pub mod filesystem;

use std::collections::BTreeMap;

use crate::strike::Strike;

pub use filesystem::filesystem_armory;

#[derive(Debug, Clone, Default)]
pub struct Armory {
    tactics: BTreeMap<String, Vec<Strike>>,
}

impl Armory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `add_tactic`.
    pub fn with_tactic(mut self, name: &str, strikes: Vec<Strike>) -> Self {
        self.add_tactic(name, strikes);
        self
    }

    /// Register `strikes` under `name`, replacing any previous registration.
    pub fn add_tactic(&mut self, name: &str, strikes: Vec<Strike>) {
        self.tactics.insert(name.to_string(), strikes);
    }

    pub fn strikes(&self, name: &str) -> Option<&[Strike]> {
        self.tactics.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tactics.contains_key(name)
    }

    /// Tactic names in sorted order.
    pub fn tactic_names(&self) -> Vec<String> {
        self.tactics.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Strike {
        Strike::new(name, |ctx| ctx.strike_result("noop"))
    }

    #[test]
    fn test_strikes_keep_registration_order() {
        let armory = Armory::new().with_tactic("t", vec![noop("b"), noop("a"), noop("c")]);
        let names: Vec<&str> = armory.strikes("t").unwrap().iter().map(Strike::name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_unknown_tactic() {
        let armory = Armory::new();
        assert!(armory.strikes("missing").is_none());
        assert!(!armory.contains("missing"));
    }

    #[test]
    fn test_add_tactic_replaces() {
        let mut armory = Armory::new().with_tactic("t", vec![noop("a")]);
        armory.add_tactic("t", vec![noop("x"), noop("y")]);
        assert_eq!(armory.strikes("t").unwrap().len(), 2);
        assert_eq!(armory.tactic_names(), vec!["t"]);
    }
}
