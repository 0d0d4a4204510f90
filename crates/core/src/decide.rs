//! The update decision and its cascade over dependents.

use std::collections::BTreeMap;

use tracing::debug;

use berth_docker::ContainerStatus;

use crate::fingerprint::Fingerprint;
use crate::graph::{DependencyGraph, NodeState, Overlay};
use crate::spec::Mode;

/// Whether one container must be updated in this run.
///
/// Toward `present` or `prepared`, a container drifts when it is forced,
/// not currently running, built from a stale commit, or started with a
/// different config fingerprint. Toward `absent`, anything that exists
/// must go.
pub fn should_update(state: &NodeState, config_fingerprint: &Fingerprint, force: bool, mode: Mode) -> bool {
  match mode {
    Mode::Absent => state.status.exists(),
    Mode::Present | Mode::Prepared => {
      force
        || state.status != ContainerStatus::Running
        || state.deployed_commit != state.latest_commit
        || state.deployed_config.as_deref() != Some(config_fingerprint.0.as_str())
    }
  }
}

/// Flag every drifted container, then cascade the flag to every transitive
/// dependent. Replacing a dependency invalidates the containers built on it,
/// whether or not they drifted themselves.
pub fn decide(
  graph: &DependencyGraph,
  overlay: &mut Overlay,
  mode: Mode,
  overrides: &BTreeMap<String, bool>,
) {
  let mut flagged = Vec::new();
  for (position, spec) in graph.specs().iter().enumerate() {
    let force = overrides.get(&spec.name).copied().unwrap_or(false);
    if should_update(overlay.state(position), &spec.config_fingerprint(), force, mode) {
      flagged.push(position);
    }
  }

  for position in flagged {
    if !overlay.state(position).update {
      debug!(container = %graph.spec(position).name, "flagged for update");
    }
    overlay.state_mut(position).update = true;
    for dependent in graph.transitive_dependents(position) {
      if !overlay.state(dependent).update {
        debug!(
          container = %graph.spec(dependent).name,
          cause = %graph.spec(position).name,
          "flagged via dependency"
        );
        overlay.state_mut(dependent).update = true;
      }
    }
  }
}
