mod apply;
mod plan;
mod status;

pub use apply::cmd_apply;
pub use plan::cmd_plan;
pub use status::cmd_status;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use berth_core::{Deployment, ReconcileRequest};

/// Read the deployment file and build the request, deriving the plan path
/// from the config path unless one was given.
fn load_request(config: &Path, plan_file: Option<&Path>) -> Result<ReconcileRequest> {
  let content =
    fs::read_to_string(config).with_context(|| format!("failed to read {}", config.display()))?;
  let deployment: Deployment =
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", config.display()))?;

  let plan_path = match plan_file {
    Some(path) => path.to_path_buf(),
    None => config.with_extension("plan.json"),
  };

  Ok(ReconcileRequest::from_deployment(&deployment, plan_path)?)
}
