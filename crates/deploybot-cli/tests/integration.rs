#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const VALID: &str = "\
github:
  owner: acme
registry:
  url: https://123.dkr.ecr.us-east-1.amazonaws.com
argocd:
  server: https://argocd.acme.internal
";

const SECRETS: [&str; 4] = [
    "GITHUB_TOKEN",
    "ARGOCD_JWT",
    "SLACK_BOT_TOKEN",
    "SLACK_SIGNING_SECRET",
];

fn deploybot(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("deploybot").unwrap();
    cmd.current_dir(dir.path())
        .env("DEPLOYBOT_CONFIG", dir.path().join("deploybot.yaml"))
        .env_remove("RUST_LOG");
    for key in SECRETS {
        cmd.env_remove(key);
    }
    cmd
}

fn with_secrets(cmd: &mut Command) -> &mut Command {
    for key in SECRETS {
        cmd.env(key, format!("{key}-value"));
    }
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("deploybot.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// deploybot --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    deploybot(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("config"));
}

// ---------------------------------------------------------------------------
// deploybot config check
// ---------------------------------------------------------------------------

#[test]
fn config_check_passes_for_complete_setup() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, VALID);
    with_secrets(&mut deploybot(&dir))
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid. No warnings."));
}

#[test]
fn config_check_warns_about_missing_secrets() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, VALID);
    deploybot(&dir)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[warning] environment variable GITHUB_TOKEN is not set",
        ));
}

#[test]
fn config_check_fails_without_owner() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "registry:\n  url: https://r.example\nargocd:\n  server: https://a.example\n",
    );
    with_secrets(&mut deploybot(&dir))
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] github.owner is not set"))
        .stderr(predicate::str::contains("error: config validation found errors"));
}

#[test]
fn config_check_json_lists_warnings() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, &format!("{VALID}  insecure_skip_verify: true\n"));
    let output = with_secrets(&mut deploybot(&dir))
        .args(["config", "check", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
}

#[test]
fn config_check_reports_unparseable_file() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "github: [unclosed\n");
    deploybot(&dir)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn config_flag_overrides_environment() {
    let dir = TempDir::new().unwrap();
    let other = dir.path().join("other.yaml");
    std::fs::write(&other, VALID).unwrap();
    with_secrets(&mut deploybot(&dir))
        .args(["config", "check", "--config"])
        .arg(&other)
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// deploybot config show
// ---------------------------------------------------------------------------

#[test]
fn config_show_includes_defaults() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, VALID);
    deploybot(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("owner: acme"))
        .stdout(predicate::str::contains("tag_path: image.tag"))
        .stdout(predicate::str::contains("max_iterations: 6"));
}

// ---------------------------------------------------------------------------
// deploybot deploy / serve
// ---------------------------------------------------------------------------

#[test]
fn deploy_requires_credentials() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, VALID);
    deploybot(&dir)
        .args(["deploy", "checkout", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn deploy_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "github:\n  owner: acme\n");
    with_secrets(&mut deploybot(&dir))
        .args(["deploy", "checkout", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("registry.url is not set"));
}

#[test]
fn serve_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    with_secrets(&mut deploybot(&dir))
        .args(["serve", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
