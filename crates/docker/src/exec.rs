//! Subprocess execution of the docker client.
//!
//! The `CommandRunner` trait is the single seam between the reconciler and
//! the host. `SystemRunner` actually spawns processes; `DryRunRunner` reports
//! success without touching anything, which is what plan previews run their
//! side effects through.

use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Error spawning or waiting on a subprocess.
///
/// A command that *ran* but exited non-zero is not an `ExecError`; callers
/// get the exit code in `CmdOutput` and decide what a failure means.
#[derive(Debug, Error)]
pub enum ExecError {
  #[error("failed to run '{argv}': {message}")]
  Spawn { argv: String, message: String },

  #[error("empty argument vector")]
  EmptyArgv,
}

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
  /// Exit code; -1 when the process was killed by a signal.
  pub status: i32,
  pub stdout: String,
  pub stderr: String,
}

impl CmdOutput {
  /// A zero exit code.
  pub fn success(&self) -> bool {
    self.status == 0
  }

  /// Synthetic success, used by the dry-run runner.
  pub fn ok() -> Self {
    Self {
      status: 0,
      stdout: String::new(),
      stderr: String::new(),
    }
  }
}

/// Runs an argument vector and reports (exit code, stdout, stderr).
pub trait CommandRunner {
  fn run(&self, argv: &[String]) -> Result<CmdOutput, ExecError>;
}

/// Spawns real subprocesses via `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  fn run(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyArgv)?;

    debug!(command = %argv.join(" "), "running");

    let output = Command::new(program)
      .args(args)
      .output()
      .map_err(|e| ExecError::Spawn {
        argv: argv.join(" "),
        message: e.to_string(),
      })?;

    Ok(CmdOutput {
      status: output.status.code().unwrap_or(-1),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }
}

/// Performs no side effect and reports success.
///
/// Used for plan previews: the engine walks the whole step list, every effect
/// "succeeds", and the host is left untouched.
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
  fn run(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
    if argv.is_empty() {
      return Err(ExecError::EmptyArgv);
    }
    debug!(command = %argv.join(" "), "dry-run, skipping");
    Ok(CmdOutput::ok())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn system_runner_captures_stdout_and_status() {
    let out = SystemRunner.run(&argv(&["echo", "hello"])).unwrap();
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[test]
  fn system_runner_reports_nonzero_exit() {
    let out = SystemRunner.run(&argv(&["false"])).unwrap();
    assert!(!out.success());
  }

  #[test]
  fn system_runner_spawn_failure_is_an_error() {
    let result = SystemRunner.run(&argv(&["/nonexistent/binary-xyz"]));
    assert!(matches!(result, Err(ExecError::Spawn { .. })));
  }

  #[test]
  fn empty_argv_is_rejected() {
    assert!(matches!(SystemRunner.run(&[]), Err(ExecError::EmptyArgv)));
  }

  #[test]
  fn dry_run_always_succeeds() {
    let out = DryRunRunner.run(&argv(&["/nonexistent/binary-xyz"])).unwrap();
    assert!(out.success());
    assert!(out.stdout.is_empty());
  }
}
