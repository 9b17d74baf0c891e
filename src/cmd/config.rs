//! Configuration view and validation commands (`raidengine config`).

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use raidengine::raid_config::{RaidToml, ServiceConfig};

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Raid Configuration");
            println!("==================");
            println!();

            if !config_path.exists() {
                println!("No raid.toml found at {}", config_path.display());
                println!();
                println!("Run 'raidengine config init' to create one.");
                println!();
                return Ok(());
            }

            println!("Config file: {}", config_path.display());
            println!();

            let toml = RaidToml::load(config_path)?;

            println!("[defaults]");
            println!(
                "  write_directory = \"{}\"",
                toml.defaults.write_directory.display()
            );
            println!("  output = \"{}\"", toml.defaults.output);
            println!("  invasive = {}", toml.defaults.invasive);
            println!();

            for (name, service) in &toml.services {
                println!("[services.{}]", name);
                println!("  tactics = {:?}", service.tactics);
                if let Some(invasive) = service.invasive {
                    println!("  invasive = {}", invasive);
                }
                if let Some(output) = &service.output {
                    println!("  output = \"{}\"", output);
                }
                if let Some(dir) = &service.write_directory {
                    println!("  write_directory = \"{}\"", dir.display());
                }
                for (key, value) in &service.vars {
                    println!("  vars.{} = \"{}\"", key, value);
                }
                println!();
            }

            // Effective values include environment overrides
            if !toml.services.is_empty() {
                println!("Effective values (with env overrides):");
                for name in toml.services.keys() {
                    match toml.service_settings(name) {
                        Ok(settings) => println!(
                            "  {}: invasive = {}, output = {}, write_directory = {}",
                            name,
                            settings.invasive,
                            settings.output,
                            settings.write_directory.display()
                        ),
                        Err(e) => println!("  {}: {}", name, e),
                    }
                }
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                anyhow::bail!(
                    "No raid.toml found at {}. Run 'raidengine config init' to create one.",
                    config_path.display()
                );
            }

            let toml = RaidToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("raid.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            let mut toml = RaidToml::default();
            toml.services.insert(
                "local".to_string(),
                ServiceConfig {
                    tactics: vec!["baseline".to_string()],
                    vars: [("target_dir".to_string(), ".".to_string())]
                        .into_iter()
                        .collect(),
                    ..ServiceConfig::default()
                },
            );
            toml.save(config_path)?;

            println!("Created raid.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] write_directory, output, invasive");
            println!("  - [services.<name>] tactics and per-service overrides");
            println!("  - [services.<name>.vars] target_dir for the built-in armory");
            println!();
        }
    }

    Ok(())
}
