//! Integration tests for Cairn

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn cairn(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cairn");
        cmd.env("CAIRN_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("layered container image builds"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cairn"));
    }

    #[test]
    fn build_help_lists_options() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["build", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--no-cache"))
            .stdout(predicate::str::contains("--instruction"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[build]"))
            .stdout(predicate::str::contains("utilize_cache = true"));
    }

    #[test]
    fn config_set_persists() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["config", "set", "build.probe_timeout_secs", "30"])
            .assert()
            .success();

        cairn(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("probe_timeout_secs = 30"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["config", "set", "build.turbo", "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[build\n").unwrap();
        cairn(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn build_with_missing_engine_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[engine]\nbinary = \"cairn-no-such-engine\"\n",
        )
        .unwrap();
        cairn(&dir)
            .args(["build", "--context"])
            .arg(dir.path())
            .args(["--from", "alpine"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container engine not found"));
    }

    #[test]
    fn build_without_instructions_fails() {
        let dir = TempDir::new().unwrap();
        cairn(&dir)
            .args(["build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing to build"));
    }
}
