//! Writing tactic results to disk.
//!
//! Each `(service, tactic)` pair gets one file:
//! `<write_directory>/<service>/<tactic>.<json|yaml>`. Directories are created
//! on demand.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, PersistError};
use crate::tactic::Tactic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    /// Guess the format of an existing results file from its extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Yaml,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat {
                value: s.to_string(),
            }),
        }
    }
}

/// The results file for a `(service, tactic)` pair. Both names become single
/// path components; anything that would escape `write_directory` is rejected.
pub fn results_path(
    write_directory: &Path,
    service: &str,
    tactic: &str,
    format: OutputFormat,
) -> Result<PathBuf, PersistError> {
    let service = path_component(service)?;
    let tactic = path_component(tactic)?;
    Ok(write_directory
        .join(service)
        .join(format!("{}.{}", tactic, format.extension())))
}

fn path_component(name: &str) -> Result<&str, PersistError> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_normal || name.contains(['/', '\\']) {
        return Err(PersistError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name)
}

/// Serialize `tactic` and write it to its results file.
pub fn write_tactic(
    write_directory: &Path,
    service: &str,
    tactic: &Tactic,
    format: OutputFormat,
) -> Result<PathBuf, PersistError> {
    let path = results_path(write_directory, service, &tactic.name, format)?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(tactic).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(tactic).map_err(|e| e.to_string()),
    }
    .map_err(|message| PersistError::Serialize {
        path: path.clone(),
        message,
    })?;

    std::fs::write(&path, content).map_err(|source| PersistError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "wrote tactic results");
    Ok(path)
}

/// Load a previously written results file.
pub fn load_tactic(path: &Path) -> Result<Tactic, PersistError> {
    let content = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match OutputFormat::from_path(path) {
        OutputFormat::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
    }
    .map_err(|message| PersistError::Parse {
        path: path.to_path_buf(),
        message,
    })
}
