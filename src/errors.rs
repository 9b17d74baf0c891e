//! Typed error hierarchy for the raid engine.
//!
//! One enum per layer:
//! - `ChangeError`: a single reversible mutation
//! - `TacticError`: the outcome of executing one tactic
//! - `ConfigError`: resolving `raid.toml` into service settings
//! - `PersistError`: writing tactic results to disk
//! - `VesselError`: the whole run for one service

use std::path::PathBuf;

use thiserror::Error;

/// Message reported whenever a change could not be undone.
pub const BAD_STATE_MESSAGE: &str =
    "One or more changes could not be reverted; the target system may be in a bad state";

/// Errors from applying or reverting a `Change`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    #[error("change has no name")]
    MissingName,

    #[error("change {name} has no description")]
    MissingDescription { name: String },

    #[error("change {name} has no apply function")]
    MissingApply { name: String },

    #[error("change {name} has no revert function")]
    MissingRevert { name: String },

    #[error("change {name} is inert after an unrecoverable error: {reason}")]
    Inert { name: String, reason: String },

    #[error("failed to apply change {name}: {reason}")]
    ApplyFailed { name: String, reason: String },

    #[error("failed to revert change {name}: {reason}")]
    RevertFailed { name: String, reason: String },
}

impl ChangeError {
    /// Whether this error leaves the target in an unknown state.
    pub fn is_bad_state(&self) -> bool {
        matches!(
            self,
            ChangeError::Inert { .. } | ChangeError::ApplyFailed { .. } | ChangeError::RevertFailed { .. }
        )
    }
}

/// Errors returned from `Tactic::execute`.
#[derive(Debug, Error)]
pub enum TacticError {
    #[error("tactic name is not set")]
    NameUnset,

    #[error("tactic {name} has already been executed")]
    AlreadyExecuted { name: String },

    #[error("{}", BAD_STATE_MESSAGE)]
    BadState { name: String },

    #[error("{succeeded}/{attempted} strikes succeeded")]
    StrikesFailed {
        name: String,
        succeeded: u32,
        attempted: u32,
    },
}

impl TacticError {
    /// Bad state is the only fatal outcome; everything else leaves the target clean.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TacticError::BadState { .. })
    }
}

/// Errors from loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported output format '{value}'. Valid values: json, yaml")]
    UnsupportedFormat { value: String },

    #[error("Service '{name}' is not defined in the configuration")]
    UnknownService { name: String },

    #[error("No tactics requested for service '{service}'")]
    NoTactics { service: String },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors from writing a tactic's results.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("'{name}' cannot be used as a results file name")]
    InvalidName { name: String },

    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results for {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    #[error("Failed to write results file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read results file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse results file at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors from a full vessel run.
#[derive(Debug, Error)]
pub enum VesselError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Tactic '{name}' is not registered in the armory")]
    UnknownTactic { name: String },

    #[error("{}", BAD_STATE_MESSAGE)]
    BadState { tactic: String },

    #[error("{failed}/{total} tactics reported failures")]
    TacticsFailed { failed: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tactic_error_strikes_failed_formats_ratio() {
        let err = TacticError::StrikesFailed {
            name: "baseline".into(),
            succeeded: 0,
            attempted: 1,
        };
        assert_eq!(err.to_string(), "0/1 strikes succeeded");
        assert!(!err.is_fatal());
    }

    #[test]
    fn tactic_error_bad_state_uses_fixed_message() {
        let err = TacticError::BadState {
            name: "baseline".into(),
        };
        assert_eq!(err.to_string(), BAD_STATE_MESSAGE);
        assert!(err.is_fatal());
    }

    #[test]
    fn change_error_bad_state_classification() {
        assert!(
            ChangeError::RevertFailed {
                name: "c".into(),
                reason: "x".into()
            }
            .is_bad_state()
        );
        assert!(
            ChangeError::ApplyFailed {
                name: "c".into(),
                reason: "x".into()
            }
            .is_bad_state()
        );
        assert!(!ChangeError::MissingName.is_bad_state());
        assert!(!ChangeError::MissingApply { name: "c".into() }.is_bad_state());
    }

    #[test]
    fn config_error_unsupported_format_names_value() {
        let err = ConfigError::UnsupportedFormat {
            value: "xml".into(),
        };
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn persist_error_invalid_name_quotes_name() {
        let err = PersistError::InvalidName {
            name: "../x".into(),
        };
        assert_eq!(err.to_string(), "'../x' cannot be used as a results file name");
    }

    #[test]
    fn vessel_error_converts_from_config_error() {
        let inner = ConfigError::UnknownService {
            name: "api".into(),
        };
        let err: VesselError = inner.into();
        match &err {
            VesselError::Config(ConfigError::UnknownService { name }) => assert_eq!(name, "api"),
            _ => panic!("Expected VesselError::Config(UnknownService)"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ChangeError::MissingName);
        assert_std_error(&TacticError::NameUnset);
        assert_std_error(&ConfigError::NoTactics {
            service: "s".into(),
        });
        assert_std_error(&VesselError::TacticsFailed {
            failed: 1,
            total: 2,
        });
    }
}
