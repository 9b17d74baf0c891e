//! Built-in armory that raids a local directory.
//!
//! The directory comes from the service var `target_dir`.
//!
//! | Tactic     | Strikes                                              |
//! |------------|------------------------------------------------------|
//! | `baseline` | `target_present`, `target_listable`                  |
//! | `invasive` | `target_present`, `canary_write`, `canary_permissions` |
//!
//! Invasive movements only run when the service is configured as invasive.
//! Every mutation they make is a `Change`, so follow-through (or an
//! interrupt) puts the directory back the way it was.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use serde_json::{Value, json};
use uuid::Uuid;

use super::Armory;
use crate::change::Change;
use crate::strike::{MovementResult, Strike, StrikeContext};

/// Service var naming the directory under test.
pub const TARGET_DIR_VAR: &str = "target_dir";

pub const BASELINE_TACTIC: &str = "baseline";
pub const INVASIVE_TACTIC: &str = "invasive";

pub fn filesystem_armory() -> Armory {
    Armory::new()
        .with_tactic(BASELINE_TACTIC, vec![target_present(), target_listable()])
        .with_tactic(
            INVASIVE_TACTIC,
            vec![target_present(), canary_write(), canary_permissions()],
        )
}

fn target_dir(ctx: &StrikeContext) -> Result<PathBuf, String> {
    ctx.var(TARGET_DIR_VAR)
        .map(PathBuf::from)
        .ok_or_else(|| {
            format!(
                "Service '{}' does not set the '{}' var",
                ctx.service_name(),
                TARGET_DIR_VAR
            )
        })
}

/// The target directory, refusing to hand out a path that would make an
/// apply fail (and leave its change in bad state) for a trivial reason.
fn existing_target_dir(ctx: &StrikeContext) -> Result<PathBuf, String> {
    let dir = target_dir(ctx)?;
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(format!("{} is not a directory", dir.display()))
    }
}

fn check_is_directory(ctx: &StrikeContext) -> MovementResult {
    let movement = MovementResult::new("Target directory exists");
    match target_dir(ctx) {
        Ok(dir) if dir.is_dir() => movement
            .pass(&format!("{} is a directory", dir.display()))
            .with_value(json!(dir)),
        Ok(dir) => movement.fail(&format!("{} is not a directory", dir.display())),
        Err(message) => movement.fail(&message),
    }
}

fn target_present() -> Strike {
    Strike::new("target_present", |ctx| {
        let mut result = ctx.strike_result("The target directory is present");
        result.execute_movement("check_is_directory", || check_is_directory(ctx));
        result
    })
}

fn target_listable() -> Strike {
    Strike::new("target_listable", |ctx| {
        let mut result = ctx.strike_result("The target directory's entries can be read");
        result.execute_movement("list_entries", || {
            let movement = MovementResult::new("Read directory entries");
            let dir = match target_dir(ctx) {
                Ok(dir) => dir,
                Err(message) => return movement.fail(&message),
            };
            match fs::read_dir(&dir) {
                Ok(entries) => {
                    let count = entries.filter_map(Result::ok).count();
                    movement
                        .pass(&format!("Listed {} entries in {}", count, dir.display()))
                        .with_value(json!(count))
                }
                Err(e) => movement.fail(&format!("Could not list {}: {}", dir.display(), e)),
            }
        });
        result
    })
}

fn canary_file_change(file_name: String, content: String) -> Change {
    Change::builder("canary_file")
        .description("Create a canary file in the target directory")
        .apply(move |_target, input| {
            let dir = input
                .get("dir")
                .and_then(Value::as_str)
                .context("canary input has no directory")?;
            let path = PathBuf::from(dir).join(&file_name);
            fs::write(&path, &content)
                .with_context(|| format!("Failed to write canary file {}", path.display()))?;
            Ok(json!({ "path": path }))
        })
        .revert(|target| {
            let path = target
                .get("path")
                .and_then(Value::as_str)
                .context("canary target has no path")?;
            fs::remove_file(path).with_context(|| format!("Failed to remove canary file {}", path))
        })
        .build()
}

fn canary_write() -> Strike {
    Strike::new("canary_write", |ctx| {
        let mut result = ctx.strike_result("The target directory accepts new files");
        result.execute_movement("check_is_directory", || check_is_directory(ctx));
        result.execute_invasive_movement("write_canary_file", || {
            let movement = MovementResult::new("Write and read back a canary file");
            let dir = match existing_target_dir(ctx) {
                Ok(dir) => dir,
                Err(message) => return movement.fail(&message),
            };

            let content = format!("raidengine canary for {}", ctx.service_name());
            let mut manager = ctx.change_manager();
            manager.add(
                "canary_file",
                canary_file_change(format!(".raidengine-canary-{}", Uuid::new_v4()), content.clone()),
            );

            let input = json!({ "dir": dir });
            let movement = match manager.apply("canary_file", ctx.service_name(), &input) {
                Some(target) => {
                    let path = target.get("path").and_then(Value::as_str).unwrap_or_default();
                    match fs::read_to_string(path) {
                        Ok(read) if read == content => movement
                            .pass(&format!("Canary file written to {}", dir.display()))
                            .with_value(target),
                        Ok(_) => movement.fail("Canary file content did not match what was written"),
                        Err(e) => movement.fail(&format!("Canary file could not be read back: {}", e)),
                    }
                }
                None => movement.fail(&format!("Could not write a canary file to {}", dir.display())),
            };
            movement.with_changes_from(&manager)
        });
        result
    })
}

fn readonly_change() -> Change {
    let original: Arc<Mutex<Option<fs::Permissions>>> = Arc::new(Mutex::new(None));
    let saved = Arc::clone(&original);

    Change::builder("readonly_flag")
        .description("Mark the target directory read-only")
        .apply(move |_target, input| {
            let dir = input
                .get("dir")
                .and_then(Value::as_str)
                .context("permissions input has no directory")?;
            let permissions = fs::metadata(dir)
                .with_context(|| format!("Failed to read permissions of {}", dir))?
                .permissions();
            let mut readonly = permissions.clone();
            readonly.set_readonly(true);
            fs::set_permissions(dir, readonly)
                .with_context(|| format!("Failed to mark {} read-only", dir))?;
            *saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(permissions);
            Ok(json!({ "path": dir }))
        })
        .revert(move |target| {
            let dir = target
                .get("path")
                .and_then(Value::as_str)
                .context("permissions target has no path")?;
            let permissions = original
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .context("original permissions were not recorded")?;
            fs::set_permissions(dir, permissions)
                .with_context(|| format!("Failed to restore permissions of {}", dir))
        })
        .build()
}

fn canary_permissions() -> Strike {
    Strike::new("canary_permissions", |ctx| {
        let mut result = ctx.strike_result("The target directory's permissions can be changed and restored");
        result.execute_movement("read_permissions", || {
            let movement = MovementResult::new("Read the target's current permissions");
            let dir = match target_dir(ctx) {
                Ok(dir) => dir,
                Err(message) => return movement.fail(&message),
            };
            match fs::metadata(&dir) {
                Ok(meta) => movement
                    .pass(&format!("Read permissions of {}", dir.display()))
                    .with_value(json!({ "readonly": meta.permissions().readonly() })),
                Err(e) => movement.fail(&format!("Could not stat {}: {}", dir.display(), e)),
            }
        });
        result.execute_invasive_movement("toggle_readonly", || {
            let movement = MovementResult::new("Flip the read-only flag");
            let dir = match existing_target_dir(ctx) {
                Ok(dir) => dir,
                Err(message) => return movement.fail(&message),
            };

            let mut manager = ctx.change_manager();
            manager.add("readonly_flag", readonly_change());

            let movement = match manager.apply("readonly_flag", ctx.service_name(), &json!({ "dir": dir })) {
                Some(target) => match fs::metadata(&dir) {
                    Ok(meta) if meta.permissions().readonly() => movement
                        .pass(&format!("{} is now read-only", dir.display()))
                        .with_value(target),
                    Ok(_) => movement.fail("Read-only flag did not stick"),
                    Err(e) => movement.fail(&format!("Could not stat {}: {}", dir.display(), e)),
                },
                None => movement.fail(&format!("Could not change permissions of {}", dir.display())),
            };
            movement.with_changes_from(&manager)
        });
        result
    })
}
