//! Tactic execution against one service (`raidengine run`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use raidengine::armory::filesystem_armory;
use raidengine::persist::OutputFormat;
use raidengine::raid_config::{RaidToml, ServiceSettings};
use raidengine::vessel::{RunSummary, TacticOutcome, Vessel};

/// CLI flags layered on top of the file and environment settings.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub tactics: Vec<String>,
    pub invasive: bool,
    pub output: Option<OutputFormat>,
    pub write_dir: Option<PathBuf>,
}

impl RunOverrides {
    fn apply(self, settings: &mut ServiceSettings) {
        if !self.tactics.is_empty() {
            settings.tactics = self.tactics;
        }
        if self.invasive {
            settings.invasive = true;
        }
        if let Some(output) = self.output {
            settings.output = output;
        }
        if let Some(dir) = self.write_dir {
            settings.write_directory = dir;
        }
    }
}

/// Run the service's tactics and return the process exit code.
pub fn cmd_run(config_path: &Path, service: &str, overrides: RunOverrides) -> Result<i32> {
    let toml = RaidToml::load(config_path).with_context(|| {
        format!(
            "Could not load {}. Run 'raidengine config init' to create one.",
            config_path.display()
        )
    })?;
    let mut settings = toml.service_settings(service)?;
    overrides.apply(&mut settings);

    let mut vessel = Vessel::new(settings, filesystem_armory());
    let summary = vessel.mobilize()?;
    print_summary(&summary);

    Ok(summary.exit_code())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "Raid on {} ({})",
        console::style(&summary.service_name).bold(),
        console::style(summary.run_id).dim()
    );
    println!();

    for tactic in &summary.tactics {
        let outcome = match tactic.outcome {
            TacticOutcome::Passed => console::style(tactic.outcome.to_string()).green(),
            TacticOutcome::BadState => console::style(tactic.outcome.to_string()).red().bold(),
            TacticOutcome::NotRun => console::style(tactic.outcome.to_string()).dim(),
            _ => console::style(tactic.outcome.to_string()).yellow(),
        };
        println!("  {:<20} {:<10} {}", tactic.name, outcome, tactic.message);
        if let Some(path) = &tactic.results_path {
            println!("  {:<20} {}", "", console::style(path.display()).dim());
        }
    }

    for failure in &summary.persist_failures {
        println!("  {} {}", console::style("error:").red(), failure);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn settings() -> ServiceSettings {
        ServiceSettings {
            service_name: "svc".to_string(),
            tactics: vec!["baseline".to_string()],
            invasive: false,
            write_directory: PathBuf::from("raid-results"),
            output: OutputFormat::Yaml,
            vars: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let mut s = settings();
        RunOverrides::default().apply(&mut s);
        assert_eq!(s, settings());
    }

    #[test]
    fn test_overrides_win() {
        let mut s = settings();
        RunOverrides {
            tactics: vec!["invasive".to_string()],
            invasive: true,
            output: Some(OutputFormat::Json),
            write_dir: Some(PathBuf::from("/tmp/out")),
        }
        .apply(&mut s);

        assert_eq!(s.tactics, vec!["invasive"]);
        assert!(s.invasive);
        assert_eq!(s.output, OutputFormat::Json);
        assert_eq!(s.write_directory, PathBuf::from("/tmp/out"));
    }
}
