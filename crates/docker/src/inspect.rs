//! Field extraction from `docker inspect` and image listing.
//!
//! The introspector wraps a `CommandRunner` and turns format-template queries
//! into single extracted strings. A non-zero exit from `docker inspect` means
//! the object does not exist; only a spawn failure propagates.

use tracing::debug;

use crate::exec::{CommandRunner, ExecError};

/// docker's placeholder for a template path that resolved to nothing.
const NO_VALUE: &str = "<no value>";

/// Observed lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
  /// No container with that name exists.
  Absent,
  /// The container exists but is not running.
  Stopped,
  /// The container is running.
  Running,
}

impl ContainerStatus {
  pub fn exists(self) -> bool {
    !matches!(self, ContainerStatus::Absent)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ContainerStatus::Absent => "absent",
      ContainerStatus::Stopped => "stopped",
      ContainerStatus::Running => "running",
    }
  }
}

impl std::fmt::Display for ContainerStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Read-only queries against the local docker daemon.
pub struct Introspector<'a> {
  runner: &'a dyn CommandRunner,
}

impl<'a> Introspector<'a> {
  pub fn new(runner: &'a dyn CommandRunner) -> Self {
    Self { runner }
  }

  /// Run `docker inspect -f <template> <target>` and return the exit code
  /// and trimmed stdout.
  pub fn inspect_format(&self, target: &str, template: &str) -> Result<(i32, String), ExecError> {
    let argv = vec![
      "docker".to_string(),
      "inspect".to_string(),
      "-f".to_string(),
      template.to_string(),
      target.to_string(),
    ];
    let out = self.runner.run(&argv)?;
    Ok((out.status, out.stdout.trim().to_string()))
  }

  /// Whether a container exists and whether it is running.
  pub fn container_status(&self, name: &str) -> Result<ContainerStatus, ExecError> {
    let (status, out) = self.inspect_format(name, "{{.State.Running}}")?;
    if status != 0 {
      return Ok(ContainerStatus::Absent);
    }
    if out == "true" {
      Ok(ContainerStatus::Running)
    } else {
      Ok(ContainerStatus::Stopped)
    }
  }

  /// Read a config label off a container or image.
  ///
  /// Returns `None` when the target does not exist or carries no such label.
  pub fn label(&self, target: &str, label: &str) -> Result<Option<String>, ExecError> {
    let template = format!("{{{{.Config.Labels.{}}}}}", label);
    let (status, out) = self.inspect_format(target, &template)?;
    if status != 0 || out.is_empty() || out == NO_VALUE {
      return Ok(None);
    }
    Ok(Some(out))
  }

  /// Resolve an image reference to its id, if it exists locally.
  pub fn image_id(&self, image: &str) -> Result<Option<String>, ExecError> {
    let (status, out) = self.inspect_format(image, "{{.Id}}")?;
    if status != 0 || out.is_empty() {
      return Ok(None);
    }
    Ok(Some(out))
  }

  /// Ids of every image present on the host.
  pub fn all_image_ids(&self) -> Result<Vec<String>, ExecError> {
    let argv = vec![
      "docker".to_string(),
      "images".to_string(),
      "-q".to_string(),
      "--no-trunc".to_string(),
    ];
    let out = self.runner.run(&argv)?;
    if !out.success() {
      debug!(stderr = %out.stderr.trim(), "docker images failed, treating as empty");
      return Ok(Vec::new());
    }
    Ok(lines(&out.stdout))
  }

  /// Ids of every image referenced by an existing container, running or not.
  pub fn owned_image_ids(&self) -> Result<Vec<String>, ExecError> {
    let argv = vec![
      "docker".to_string(),
      "ps".to_string(),
      "-a".to_string(),
      "--format".to_string(),
      "{{.ImageID}}".to_string(),
    ];
    let out = self.runner.run(&argv)?;
    if !out.success() {
      debug!(stderr = %out.stderr.trim(), "docker ps failed, treating as empty");
      return Ok(Vec::new());
    }
    Ok(lines(&out.stdout))
  }
}

fn lines(stdout: &str) -> Vec<String> {
  stdout
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::exec::CmdOutput;

  /// Replays canned outputs and records every argv it was given.
  struct ScriptedRunner {
    outputs: RefCell<Vec<CmdOutput>>,
    calls: RefCell<Vec<Vec<String>>>,
  }

  impl ScriptedRunner {
    fn new(outputs: Vec<CmdOutput>) -> Self {
      Self {
        outputs: RefCell::new(outputs),
        calls: RefCell::new(Vec::new()),
      }
    }
  }

  impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
      self.calls.borrow_mut().push(argv.to_vec());
      Ok(self.outputs.borrow_mut().remove(0))
    }
  }

  fn output(status: i32, stdout: &str) -> CmdOutput {
    CmdOutput {
      status,
      stdout: stdout.to_string(),
      stderr: String::new(),
    }
  }

  #[test]
  fn running_container() {
    let runner = ScriptedRunner::new(vec![output(0, "true\n")]);
    let status = Introspector::new(&runner).container_status("web").unwrap();
    assert_eq!(status, ContainerStatus::Running);
  }

  #[test]
  fn stopped_container() {
    let runner = ScriptedRunner::new(vec![output(0, "false\n")]);
    let status = Introspector::new(&runner).container_status("web").unwrap();
    assert_eq!(status, ContainerStatus::Stopped);
  }

  #[test]
  fn missing_container_is_absent() {
    let runner = ScriptedRunner::new(vec![output(1, "")]);
    let status = Introspector::new(&runner).container_status("web").unwrap();
    assert_eq!(status, ContainerStatus::Absent);
    assert!(!status.exists());
  }

  #[test]
  fn label_present() {
    let runner = ScriptedRunner::new(vec![output(0, "abc123\n")]);
    let label = Introspector::new(&runner).label("web", "commitId").unwrap();
    assert_eq!(label.as_deref(), Some("abc123"));

    let calls = runner.calls.borrow();
    assert_eq!(calls[0][3], "{{.Config.Labels.commitId}}");
  }

  #[test]
  fn missing_label_is_none() {
    let runner = ScriptedRunner::new(vec![output(0, "<no value>\n")]);
    let label = Introspector::new(&runner).label("web", "commitId").unwrap();
    assert_eq!(label, None);
  }

  #[test]
  fn label_on_missing_target_is_none() {
    let runner = ScriptedRunner::new(vec![output(1, "")]);
    let label = Introspector::new(&runner).label("web", "commitId").unwrap();
    assert_eq!(label, None);
  }

  #[test]
  fn image_listing_splits_lines() {
    let runner = ScriptedRunner::new(vec![output(0, "sha256:aaa\nsha256:bbb\n\n")]);
    let ids = Introspector::new(&runner).all_image_ids().unwrap();
    assert_eq!(ids, vec!["sha256:aaa", "sha256:bbb"]);
  }
}
