//! Implementation of the `berth status` command.

use std::path::Path;

use anyhow::Result;

use berth_core::survey;
use berth_docker::{HttpManifestFetcher, SystemRunner};

use crate::output;

/// Observe every declared container and report its status and drift.
/// Purely diagnostic: nothing on the host is touched.
pub fn cmd_status(config: &Path) -> Result<()> {
  let request = super::load_request(config, None)?;
  let runner = SystemRunner;
  let fetcher = HttpManifestFetcher::new();

  let reports = survey(&request, &runner, &fetcher)?;

  for report in &reports {
    let commit = match (&report.deployed_commit, &report.latest_commit) {
      (Some(deployed), Some(latest)) if deployed == latest => format!("commit {}", deployed),
      (Some(deployed), Some(latest)) => format!("commit {} (latest {})", deployed, latest),
      (Some(deployed), None) => format!("commit {}", deployed),
      (None, Some(latest)) => format!("latest {}", latest),
      (None, None) => "no commit info".to_string(),
    };

    if report.update {
      output::print_warning(&format!("{}: {}, {}, update required", report.name, report.status, commit));
    } else {
      output::print_success(&format!("{}: {}, {}", report.name, report.status, commit));
    }
  }

  let drifted = reports.iter().filter(|r| r.update).count();
  println!();
  output::print_stat("containers", &reports.len().to_string());
  output::print_stat("drifted", &drifted.to_string());

  Ok(())
}
