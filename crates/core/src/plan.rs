//! Plan synthesis: the flagged graph becomes an ordered step list.
//!
//! Phase order is fixed: stop (reverse declaration order), prepare
//! (declaration order), start (declaration order, present mode only),
//! cleanup. The plan carries the desired-state fingerprint it was computed
//! for, so the store can tell resumption apart from reconfiguration.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::graph::{DependencyGraph, Overlay};
use crate::inspect::CONFIG_LABEL;
use crate::spec::{Mode, NormalizedSpec, PatchOp, desired_state_fingerprint};

/// One unit of work. Closed sum, dispatched exhaustively by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
  /// Run a caller-supplied command verbatim.
  RunShellCommand { argv: Vec<String> },
  /// Pull an image from its registry.
  PullImage { image: String },
  /// Build `result_image` by applying patch ops on top of `base_image`.
  PatchImage {
    base_image: String,
    patch_ops: Vec<PatchOp>,
    result_image: String,
  },
  /// Remove unowned images, sparing everything this plan references.
  RemoveImages {
    candidate_ids: Vec<String>,
    protect_images: Vec<String>,
  },
  /// Stop (if running) and remove (if present) one container.
  StopContainer { name: String },
  /// Start one container with a synthesized argv.
  StartContainer { argv: Vec<String>, name: String },
}

impl std::fmt::Display for Step {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Step::RunShellCommand { argv } => write!(f, "run {}", argv.join(" ")),
      Step::PullImage { image } => write!(f, "pull {}", image),
      Step::PatchImage { base_image, result_image, .. } => {
        write!(f, "patch {} into {}", base_image, result_image)
      }
      Step::RemoveImages { candidate_ids, .. } => {
        write!(f, "remove unused images ({} candidates)", candidate_ids.len())
      }
      Step::StopContainer { name } => write!(f, "stop {}", name),
      Step::StartContainer { name, .. } => write!(f, "start {}", name),
    }
  }
}

/// A persisted reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
  pub desired_state_fingerprint: Fingerprint,
  pub steps: Vec<Step>,
}

impl Plan {
  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }
}

/// Everything the builder needs for one synthesis pass.
pub struct PlanInputs<'a> {
  pub mode: Mode,
  pub graph: &'a DependencyGraph,
  pub overlay: &'a Overlay,
  /// Whether the cleanup phase is wanted at all.
  pub remove_unused_images: bool,
  /// Image ids observed with no owning container, candidates for cleanup.
  pub unowned_images: Vec<String>,
}

/// Synthesize the step list for one decided graph.
pub fn build_plan(inputs: &PlanInputs<'_>) -> Plan {
  let fingerprint = desired_state_fingerprint(inputs.mode, inputs.graph.specs());
  let mut steps = Vec::new();

  if !inputs.overlay.any_update() {
    return Plan {
      desired_state_fingerprint: fingerprint,
      steps,
    };
  }

  let flagged = |position: &usize| inputs.overlay.state(*position).update;

  // Stop phase: dependents come down before what they sit on.
  for position in (0..inputs.graph.len()).rev().filter(flagged) {
    if inputs.overlay.state(position).status.exists() {
      steps.push(Step::StopContainer {
        name: inputs.graph.spec(position).name.clone(),
      });
    }
  }

  // Prepare phase: images ready before anything starts.
  if inputs.mode != Mode::Absent {
    for position in (0..inputs.graph.len()).filter(flagged) {
      let spec = inputs.graph.spec(position);
      steps.push(Step::PullImage {
        image: spec.image.canonical(),
      });
      if !spec.patches.is_empty() {
        steps.push(Step::PatchImage {
          base_image: spec.image.canonical(),
          patch_ops: spec.patches.clone(),
          result_image: spec.start_image(),
        });
      }
    }
  }

  // Start phase: dependencies first, declaration order.
  if inputs.mode == Mode::Present {
    for position in (0..inputs.graph.len()).filter(flagged) {
      let spec = inputs.graph.spec(position);
      match &spec.command {
        Some(command) => steps.push(Step::RunShellCommand { argv: command.clone() }),
        None => steps.push(Step::StartContainer {
          argv: build_start_argv(spec),
          name: spec.name.clone(),
        }),
      }
    }
  }

  if inputs.remove_unused_images && inputs.mode != Mode::Prepared {
    let mut protect = Vec::new();
    if inputs.mode != Mode::Absent {
      for position in (0..inputs.graph.len()).filter(flagged) {
        let spec = inputs.graph.spec(position);
        protect.push(spec.image.canonical());
        if !spec.patches.is_empty() {
          protect.push(spec.start_image());
        }
      }
    }
    steps.push(Step::RemoveImages {
      candidate_ids: inputs.unowned_images.clone(),
      protect_images: protect,
    });
  }

  Plan {
    desired_state_fingerprint: fingerprint,
    steps,
  }
}

/// The full `docker run` invocation for one normalized spec.
///
/// Flag order is fixed so the argv is deterministic for a given spec.
pub fn build_start_argv(spec: &NormalizedSpec) -> Vec<String> {
  let mut argv = vec![
    "docker".to_string(),
    "run".to_string(),
    "--name".to_string(),
    spec.name.clone(),
    "--label".to_string(),
    format!("{}={}", CONFIG_LABEL, spec.config_fingerprint()),
  ];

  if spec.daemon {
    argv.push("--restart".to_string());
    argv.push("always".to_string());
    argv.push("-d".to_string());
  }

  for port in &spec.ports {
    argv.push("-p".to_string());
    argv.push(format!("{}:{}", port.host, port.container));
  }

  for volume in &spec.volumes {
    argv.push("-v".to_string());
    match &volume.mode {
      Some(mode) => argv.push(format!("{}:{}:{}", volume.host, volume.container, mode)),
      None => argv.push(format!("{}:{}", volume.host, volume.container)),
    }
  }

  for provider in &spec.volumes_from {
    argv.push("--volumes-from".to_string());
    argv.push(provider.clone());
  }

  for link in &spec.links {
    argv.push("--link".to_string());
    argv.push(format!("{}:{}", link.name, link.alias));
  }

  for (key, value) in &spec.env {
    argv.push("-e".to_string());
    argv.push(format!("{}={}", key, value));
  }

  argv.extend(spec.extra_options.iter().cloned());
  argv.push(spec.start_image());
  argv.extend(spec.args.iter().cloned());

  argv
}
