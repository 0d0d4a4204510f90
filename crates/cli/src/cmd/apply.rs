//! Implementation of the `berth apply` command.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use berth_core::{ReconcileOptions, reconcile};
use berth_docker::{HttpManifestFetcher, SystemRunner};

use crate::output;

/// Run one full reconciliation against the live host.
///
/// On failure the remaining steps (the failed one first) stay persisted in
/// the plan file; rerunning `apply` with an unchanged deployment resumes
/// there instead of recomputing.
pub fn cmd_apply(config: &Path, plan_file: Option<&Path>) -> Result<()> {
  let request = super::load_request(config, plan_file)?;
  let runner = SystemRunner;
  let fetcher = HttpManifestFetcher::new();

  let report = reconcile(&request, &runner, &fetcher, ReconcileOptions::default())?;

  for step in &report.executed {
    output::print_success(&step.to_string());
  }

  if let Some(failure) = &report.failure {
    output::print_error(&format!("{}: {}", failure.step, failure.message));
    output::print_stat("steps persisted for retry", &report.remaining.len().to_string());
    info!(path = %request.plan_path.display(), "remaining plan persisted");
    anyhow::bail!("reconciliation halted");
  }

  if report.changed {
    println!();
    println!("Reconciliation complete!");
    output::print_stat("steps applied", &report.executed.len().to_string());
  } else {
    output::print_info("nothing to do, host matches the declared state");
  }

  Ok(())
}
