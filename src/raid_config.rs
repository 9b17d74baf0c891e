//! Configuration for raid runs, read from `raid.toml`.
//!
//! Values are layered: file, then environment, then CLI flags (applied by
//! the command layer).
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! write_directory = "raid-results"
//! output = "yaml"
//! invasive = false
//!
//! [services.storage]
//! tactics = ["baseline", "invasive"]
//! invasive = true
//! output = "json"
//!
//! [services.storage.vars]
//! target_dir = "/srv/storage"
//! ```
//!
//! # Environment
//!
//! - `RAID_INVASIVE`: `true`/`1` enables invasive movements for every service
//! - `RAID_WRITE_DIRECTORY`: overrides the results directory
//! - `RAID_OUTPUT`: overrides the output format

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::persist::{OutputFormat, results_path};

pub const DEFAULT_CONFIG_FILE: &str = "raid.toml";

pub const ENV_INVASIVE: &str = "RAID_INVASIVE";
pub const ENV_WRITE_DIRECTORY: &str = "RAID_WRITE_DIRECTORY";
pub const ENV_OUTPUT: &str = "RAID_OUTPUT";

/// Settings shared by every service unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_write_directory")]
    pub write_directory: PathBuf,
    /// Kept as a string so an unsupported value surfaces as a config error
    /// when the service is resolved, not as a parse failure of the file.
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub invasive: bool,
}

fn default_write_directory() -> PathBuf {
    PathBuf::from("raid-results")
}

fn default_output() -> String {
    "yaml".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            write_directory: default_write_directory(),
            output: default_output(),
            invasive: false,
        }
    }
}

/// Per-service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Tactics to run, in order
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invasive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Free-form values handed to strikes (e.g. `target_dir`)
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// The complete raid.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaidToml {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// Fully resolved settings for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub service_name: String,
    pub tactics: Vec<String>,
    pub invasive: bool,
    pub write_directory: PathBuf,
    pub output: OutputFormat,
    pub vars: BTreeMap<String, String>,
}

impl RaidToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path`, or the defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve settings for `service`, reading overrides from the process
    /// environment.
    pub fn service_settings(&self, service: &str) -> Result<ServiceSettings, ConfigError> {
        self.service_settings_with_env(service, |key| std::env::var(key).ok())
    }

    /// Resolve settings for `service` with an explicit environment lookup.
    pub fn service_settings_with_env<F>(
        &self,
        service: &str,
        env: F,
    ) -> Result<ServiceSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self
            .services
            .get(service)
            .ok_or_else(|| ConfigError::UnknownService {
                name: service.to_string(),
            })?;

        let invasive = match env(ENV_INVASIVE) {
            Some(value) => parse_bool(&value),
            None => config.invasive.unwrap_or(self.defaults.invasive),
        };
        let write_directory = env(ENV_WRITE_DIRECTORY)
            .map(PathBuf::from)
            .or_else(|| config.write_directory.clone())
            .unwrap_or_else(|| self.defaults.write_directory.clone());
        let output = env(ENV_OUTPUT)
            .or_else(|| config.output.clone())
            .unwrap_or_else(|| self.defaults.output.clone())
            .parse::<OutputFormat>()?;

        Ok(ServiceSettings {
            service_name: service.to_string(),
            tactics: config.tactics.clone(),
            invasive,
            write_directory,
            output,
            vars: config.vars.clone(),
        })
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.output.parse::<OutputFormat>().is_err() {
            warnings.push(format!(
                "Invalid output '{}' in [defaults]: should be json or yaml",
                self.defaults.output
            ));
        }

        if self.services.is_empty() {
            warnings.push("No services defined".to_string());
        }

        for (name, service) in &self.services {
            if results_path(Path::new("."), name, "tactic", OutputFormat::Yaml).is_err() {
                warnings.push(format!(
                    "Service '{}' cannot be used as a results directory name",
                    name
                ));
            }
            if service.tactics.is_empty() {
                warnings.push(format!("Service '{}' requests no tactics", name));
            }
            if let Some(output) = &service.output
                && output.parse::<OutputFormat>().is_err()
            {
                warnings.push(format!(
                    "Invalid output '{}' for service '{}': should be json or yaml",
                    output, name
                ));
            }
        }

        warnings
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
