//! Runs the requested tactics of one service and persists their results.
//!
//! A vessel resolves each requested tactic name against its armory, executes
//! the tactics in order, and writes every executed tactic to
//! `<write_directory>/<service>/<tactic>.<ext>`. A tactic that ends in bad
//! state stops the run; tactics after it are reported as not run.
//!
//! All tactics of one vessel share a single executed-strike list, so a strike
//! that already ran under an earlier tactic is skipped by later ones.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::armory::Armory;
use crate::errors::{ConfigError, VesselError};
use crate::persist::write_tactic;
use crate::raid_config::ServiceSettings;
use crate::strike::StrikeContext;
use crate::tactic::{ExecutedStrikes, Tactic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TacticOutcome {
    Passed,
    Failed,
    BadState,
    /// The armory has no tactic with this name.
    Unknown,
    /// Skipped because an earlier tactic left the target in bad state.
    NotRun,
}

impl fmt::Display for TacticOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TacticOutcome::Passed => "passed",
            TacticOutcome::Failed => "failed",
            TacticOutcome::BadState => "bad state",
            TacticOutcome::Unknown => "unknown",
            TacticOutcome::NotRun => "not run",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TacticSummary {
    pub name: String,
    pub outcome: TacticOutcome,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_path: Option<PathBuf>,
}

impl TacticSummary {
    fn without_run(name: &str, outcome: TacticOutcome, message: String) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            attempts: 0,
            successes: 0,
            failures: 0,
            message,
            results_path: None,
        }
    }
}

/// Outcome of one `Vessel::mobilize` call.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub service_name: String,
    pub tactics: Vec<TacticSummary>,
    pub persisted: Vec<PathBuf>,
    /// Results that could not be written, as display strings.
    pub persist_failures: Vec<String>,
}

impl RunSummary {
    pub fn bad_state(&self) -> bool {
        self.tactics
            .iter()
            .any(|t| t.outcome == TacticOutcome::BadState)
    }

    fn failed_count(&self) -> usize {
        self.tactics
            .iter()
            .filter(|t| matches!(t.outcome, TacticOutcome::Failed | TacticOutcome::Unknown))
            .count()
    }

    /// 0 when everything passed, 2 on bad state, 1 for any other failure.
    pub fn exit_code(&self) -> i32 {
        if self.bad_state() {
            2
        } else if self.failed_count() > 0 || !self.persist_failures.is_empty() {
            1
        } else {
            0
        }
    }

    /// Collapse the summary into a single result.
    pub fn check(&self) -> Result<(), VesselError> {
        if let Some(halted) = self
            .tactics
            .iter()
            .find(|t| t.outcome == TacticOutcome::BadState)
        {
            return Err(VesselError::BadState {
                tactic: halted.name.clone(),
            });
        }
        let failed = self.failed_count();
        if failed > 0 {
            return Err(VesselError::TacticsFailed {
                failed,
                total: self.tactics.len(),
            });
        }
        Ok(())
    }
}

pub struct Vessel {
    run_id: Uuid,
    settings: ServiceSettings,
    armory: Armory,
    tactics: Vec<Tactic>,
    executed: ExecutedStrikes,
    listen_for_signals: bool,
}

impl Vessel {
    pub fn new(settings: ServiceSettings, armory: Armory) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings,
            armory,
            tactics: Vec::new(),
            executed: ExecutedStrikes::new(),
            listen_for_signals: true,
        }
    }

    /// Keep tactics from registering with the process-wide interrupt listener.
    pub fn with_signal_listener(mut self, enabled: bool) -> Self {
        self.listen_for_signals = enabled;
        self
    }

    /// Resume from an earlier run: strikes named in `executed` are skipped.
    pub fn with_executed_strikes(mut self, executed: ExecutedStrikes) -> Self {
        self.executed = executed;
        self
    }

    pub fn executed_strikes(&self) -> &ExecutedStrikes {
        &self.executed
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Tactics executed by the last `mobilize` call.
    pub fn tactics(&self) -> &[Tactic] {
        &self.tactics
    }

    pub fn mobilize(&mut self) -> Result<RunSummary, VesselError> {
        let span = info_span!("raid", run_id = %self.run_id, service = %self.settings.service_name);
        let _guard = span.enter();

        if self.settings.tactics.is_empty() {
            return Err(ConfigError::NoTactics {
                service: self.settings.service_name.clone(),
            }
            .into());
        }

        info!(
            tactics = ?self.settings.tactics,
            invasive = self.settings.invasive,
            "mobilizing"
        );

        let context = StrikeContext::new(&self.settings.service_name, self.settings.invasive)
            .with_vars(self.settings.vars.clone());
        let mut summary = RunSummary {
            run_id: self.run_id,
            service_name: self.settings.service_name.clone(),
            tactics: Vec::new(),
            persisted: Vec::new(),
            persist_failures: Vec::new(),
        };
        self.tactics.clear();

        let requested = self.settings.tactics.clone();
        for name in &requested {
            if summary.bad_state() {
                warn!(tactic = %name, "not running tactic after bad state");
                summary.tactics.push(TacticSummary::without_run(
                    name,
                    TacticOutcome::NotRun,
                    "Skipped after an earlier tactic left the target in a bad state".to_string(),
                ));
                continue;
            }

            let Some(strikes) = self.armory.strikes(name) else {
                let err = VesselError::UnknownTactic { name: name.clone() };
                error!(tactic = %name, "{}", err);
                summary.tactics.push(TacticSummary::without_run(
                    name,
                    TacticOutcome::Unknown,
                    err.to_string(),
                ));
                continue;
            };

            let mut tactic = Tactic::new(name, strikes.to_vec(), context.clone())
                .with_executed_strikes(self.executed.clone())
                .with_signal_listener(self.listen_for_signals);
            let (outcome, message) = match tactic.execute() {
                Ok(()) => (TacticOutcome::Passed, "All strikes passed".to_string()),
                Err(e) if e.is_fatal() => (TacticOutcome::BadState, e.to_string()),
                Err(e) => (TacticOutcome::Failed, e.to_string()),
            };

            let results_path = self.persist(&tactic, &mut summary);
            summary.tactics.push(TacticSummary {
                name: name.clone(),
                outcome,
                attempts: tactic.attempts,
                successes: tactic.successes,
                failures: tactic.failures,
                message,
                results_path,
            });
            self.tactics.push(tactic);
        }

        info!(exit_code = summary.exit_code(), "raid finished");
        Ok(summary)
    }

    fn persist(&self, tactic: &Tactic, summary: &mut RunSummary) -> Option<PathBuf> {
        match write_tactic(
            &self.settings.write_directory,
            &self.settings.service_name,
            tactic,
            self.settings.output,
        ) {
            Ok(path) => {
                info!(tactic = %tactic.name, path = %path.display(), "results written");
                summary.persisted.push(path.clone());
                Some(path)
            }
            Err(e) => {
                error!(tactic = %tactic.name, error = %e, "failed to write results");
                summary.persist_failures.push(e.to_string());
                None
            }
        }
    }
}
