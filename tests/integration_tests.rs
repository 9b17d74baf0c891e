//! Integration tests for raidengine
//!
//! These tests drive the binary end to end against temporary directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a raidengine Command with no environment overrides
fn raidengine() -> Command {
    let mut cmd = cargo_bin_cmd!("raidengine");
    cmd.env_remove("RAID_INVASIVE")
        .env_remove("RAID_WRITE_DIRECTORY")
        .env_remove("RAID_OUTPUT")
        .env_remove("RAIDENGINE_LOG");
    cmd
}

/// Write a raid.toml whose `local` service targets `target`
fn write_config(dir: &TempDir, target: &Path, extra: &str) {
    let content = format!(
        r#"
[defaults]
write_directory = "{results}"
output = "yaml"

[services.local]
tactics = ["baseline"]
{extra}

[services.local.vars]
target_dir = "{target}"
"#,
        results = dir.path().join("results").display(),
        target = target.display(),
        extra = extra,
    );
    fs::write(dir.path().join("raid.toml"), content).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_raidengine_help() {
        raidengine()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("report"));
    }

    #[test]
    fn test_raidengine_version() {
        raidengine().arg("--version").assert().success();
    }

    #[test]
    fn test_list_shows_builtin_tactics() {
        raidengine()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("baseline"))
            .stdout(predicate::str::contains("target_listable"))
            .stdout(predicate::str::contains("canary_permissions"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_without_file() {
        let dir = TempDir::new().unwrap();

        raidengine()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No raid.toml found"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = TempDir::new().unwrap();

        raidengine()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created raid.toml"));

        let content = fs::read_to_string(dir.path().join("raid.toml")).unwrap();
        assert!(content.contains("[defaults]"));
        assert!(content.contains("[services.local]"));

        raidengine()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_without_file_fails() {
        let dir = TempDir::new().unwrap();

        raidengine()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No raid.toml found"));
    }

    #[test]
    fn test_config_validate_reports_bad_output() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, dir.path(), r#"output = "xml""#);

        raidengine()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Invalid output 'xml'"));
    }

    #[test]
    fn test_config_show_with_explicit_path() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, dir.path(), "");

        raidengine()
            .arg("--config")
            .arg(dir.path().join("raid.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[services.local]"))
            .stdout(predicate::str::contains("vars.target_dir"));
    }
}

// =============================================================================
// Run and Report Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_baseline_writes_results() {
        let dir = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(target.path().join("data.txt"), "x").unwrap();
        write_config(&dir, target.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "local"])
            .assert()
            .success()
            .stdout(predicate::str::contains("passed"));

        let results = dir.path().join("results/local/baseline.yaml");
        let content = fs::read_to_string(results).unwrap();
        assert!(content.contains("target_present"));
        assert!(content.contains("status: completed"));
    }

    #[test]
    fn test_run_missing_target_exits_one() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, &dir.path().join("does-not-exist"), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "local"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("0/2 strikes succeeded"));
    }

    #[test]
    fn test_run_unknown_service_fails() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, dir.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not defined"));
    }

    #[test]
    fn test_run_unknown_tactic_is_reported() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, dir.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "local", "--tactic", "missing"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("not registered"));
    }

    #[test]
    fn test_run_invasive_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_config(&dir, target.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args([
                "run",
                "--service",
                "local",
                "--tactic",
                "invasive",
                "--invasive",
                "--output",
                "json",
            ])
            .assert()
            .success();

        assert_eq!(fs::read_dir(target.path()).unwrap().count(), 0);
        assert!(!fs::metadata(target.path()).unwrap().permissions().readonly());

        let results = dir.path().join("results/local/invasive.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(results).unwrap()).unwrap();
        assert_eq!(
            json["strike_results"]["canary_write"]["movements"]["write_canary_file"]["changes"]
                ["canary_file"]["reverted"],
            true
        );
    }

    #[test]
    fn test_write_dir_flag_overrides_config() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_config(&dir, dir.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "local", "--write-dir"])
            .arg(out.path())
            .assert()
            .success();

        assert!(out.path().join("local/baseline.yaml").exists());
    }

    #[test]
    fn test_report_prints_persisted_results() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, dir.path(), "");

        raidengine()
            .current_dir(dir.path())
            .args(["run", "--service", "local"])
            .assert()
            .success();

        raidengine()
            .current_dir(dir.path())
            .arg("report")
            .arg(dir.path().join("results/local/baseline.yaml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("PASSED"))
            .stdout(predicate::str::contains("target_listable"));
    }

    #[test]
    fn test_report_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();

        raidengine()
            .arg("report")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse results file"));
    }
}
