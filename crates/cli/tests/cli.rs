//! CLI smoke tests. Nothing here touches a container runtime: every case
//! fails (or prints help) before the first external command would run.

use assert_cmd::Command;
use predicates::prelude::*;

fn berth() -> Command {
  Command::cargo_bin("berth").unwrap()
}

#[test]
fn help_lists_subcommands() {
  berth()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("apply"))
    .stdout(predicate::str::contains("plan"))
    .stdout(predicate::str::contains("status"));
}

#[test]
fn missing_config_is_a_readable_error() {
  berth()
    .args(["plan", "/nonexistent/deploy.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn malformed_config_is_a_parse_error() {
  let dir = tempfile::tempdir().unwrap();
  let config = dir.path().join("deploy.json");
  std::fs::write(&config, "{ not json").unwrap();

  berth()
    .arg("plan")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn bad_override_value_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let config = dir.path().join("deploy.json");
  std::fs::write(
    &config,
    serde_json::json!({
      "containers": [{ "name": "web", "image": "nginx" }],
      "force_restart": { "web": "maybe" }
    })
    .to_string(),
  )
  .unwrap();

  berth()
    .arg("apply")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot parse"));
}

#[test]
fn unknown_reference_fails_before_any_effect() {
  let dir = tempfile::tempdir().unwrap();
  let config = dir.path().join("deploy.json");
  std::fs::write(
    &config,
    serde_json::json!({
      "containers": [
        { "name": "web", "image": "nginx", "volumes_from": ["ghost"] }
      ]
    })
    .to_string(),
  )
  .unwrap();

  berth()
    .arg("plan")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown container 'ghost'"));

  // No plan file was left behind.
  assert!(!dir.path().join("deploy.plan.json").exists());
}
