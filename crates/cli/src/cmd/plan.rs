//! Implementation of the `berth plan` command.

use std::path::Path;

use anyhow::Result;

use berth_core::{ReconcileOptions, reconcile};
use berth_docker::{HttpManifestFetcher, SystemRunner};

use crate::output;

/// Preview the reconciliation. Inspections run against the live host, but
/// every effect goes through the no-op runner and nothing is persisted.
pub fn cmd_plan(config: &Path, plan_file: Option<&Path>) -> Result<()> {
  let request = super::load_request(config, plan_file)?;
  let runner = SystemRunner;
  let fetcher = HttpManifestFetcher::new();

  let report = reconcile(&request, &runner, &fetcher, ReconcileOptions { dry_run: true })?;

  if !report.changed {
    output::print_info("no changes, host matches the declared state");
    return Ok(());
  }

  println!("Steps that would run:");
  for step in &report.executed {
    output::print_step(&step.to_string());
  }
  println!();
  output::print_stat("total", &report.executed.len().to_string());

  Ok(())
}
