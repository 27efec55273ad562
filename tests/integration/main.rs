//! Integration tests for the box CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Command isolated from the user's config and cache
    fn boxcmd(dir: &Path) -> Command {
        let config = write_config(dir);
        let mut cmd = cargo_bin_cmd!("box");
        cmd.env("BOXER_CONFIG", config).env_remove("NO_CACHE");
        cmd
    }

    fn write_config(dir: &Path) -> PathBuf {
        let config = dir.join("config.toml");
        let cache = dir.join("cache.json");
        std::fs::write(
            &config,
            format!("[cache]\npath = {:?}\n\n[runtime]\nbinary = \"box-test-missing-runtime\"\n", cache),
        )
        .unwrap();
        config
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("scriptable container image builder"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("box"));
    }

    #[test]
    fn config_path_honours_env() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[build]"))
            .stdout(predicate::str::contains("box-test-missing-runtime"));
    }

    #[test]
    fn config_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn cache_path_from_config() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache.json"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_empty() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stderr(predicate::str::contains("already empty"));
    }

    #[test]
    fn corrupt_cache_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cache.json"), "not json").unwrap();
        boxcmd(dir.path())
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unreadable"))
            .stderr(predicate::str::contains("box cache clear"));
    }

    #[test]
    fn clear_recovers_corrupt_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cache.json"), "not json").unwrap();
        boxcmd(dir.path())
            .args(["cache", "clear", "--yes"])
            .assert()
            .success();
        boxcmd(dir.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn build_missing_script() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["build", "does-not-exist.lua"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Script not found"));
    }

    #[test]
    fn build_reads_script_from_stdin() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .args(["build", "-"])
            .write_stdin("from('alpine')")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container runtime not found"))
            .stderr(predicate::str::contains("Script not found").not());
    }

    #[test]
    fn build_without_runtime() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("build.lua");
        std::fs::write(&script, "from('alpine')").unwrap();

        boxcmd(dir.path())
            .arg("build")
            .arg(&script)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container runtime not found"));
    }

    #[test]
    fn invalid_no_cache_value() {
        let dir = TempDir::new().unwrap();
        boxcmd(dir.path())
            .env("NO_CACHE", "maybe")
            .args(["build", "build.lua"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected a boolean"));
    }
}
