//! One full reconciliation pass, front to back.
//!
//! A persisted plan whose fingerprint matches the freshly computed desired
//! state is resumed verbatim; observation and planning are skipped entirely.
//! Anything else (no plan, or a stale one) triggers the full pipeline:
//! normalize, graph, observe, decide, build, persist, execute.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use berth_docker::{CommandRunner, ContainerStatus, DryRunRunner, ExecError, ManifestFetcher};

use crate::decide::decide;
use crate::engine::{Engine, EngineError, StepFailure};
use crate::graph::{DependencyGraph, GraphError};
use crate::inspect::{observe, unowned_images};
use crate::plan::{PlanInputs, Step, build_plan};
use crate::spec::{ContainerSpec, Deployment, Mode, SpecError, desired_state_fingerprint, normalize_all};
use crate::store::{PlanStore, PlanStoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error(transparent)]
  Spec(#[from] SpecError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error(transparent)]
  Store(#[from] PlanStoreError),

  #[error(transparent)]
  Engine(#[from] EngineError),
}

/// Everything one reconciliation call needs, no ambient state.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
  pub mode: Mode,
  pub containers: Vec<ContainerSpec>,
  pub force_restart: BTreeMap<String, bool>,
  pub remove_unused_images: bool,
  pub plan_path: PathBuf,
}

impl ReconcileRequest {
  pub fn from_deployment(deployment: &Deployment, plan_path: PathBuf) -> Result<Self, SpecError> {
    Ok(Self {
      mode: deployment.state,
      containers: deployment.containers.clone(),
      force_restart: deployment.parsed_overrides()?,
      remove_unused_images: deployment.remove_unused_images,
      plan_path,
    })
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
  /// Preview only: effects go through the no-op runner, nothing persists.
  pub dry_run: bool,
}

/// The caller-facing outcome of one pass.
#[derive(Debug)]
pub struct ReconcileReport {
  /// True iff at least one step executed this invocation.
  pub changed: bool,
  pub executed: Vec<Step>,
  pub failure: Option<StepFailure>,
  /// Steps still pending (non-empty only after a failure).
  pub remaining: Vec<Step>,
}

/// Run one reconciliation.
pub fn reconcile(
  request: &ReconcileRequest,
  runner: &dyn CommandRunner,
  fetcher: &dyn ManifestFetcher,
  options: ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
  let specs = normalize_all(&request.containers)?;
  let fingerprint = desired_state_fingerprint(request.mode, &specs);
  let store = PlanStore::new(&request.plan_path);

  let mut plan = match store.load()? {
    Some(persisted) if persisted.desired_state_fingerprint == fingerprint => {
      info!(steps = persisted.len(), "resuming persisted plan");
      persisted
    }
    persisted => {
      if persisted.is_some() {
        info!("desired state changed, discarding persisted plan");
      }
      let graph = DependencyGraph::build(specs)?;
      let mut overlay = observe(&graph, runner, fetcher)?;
      decide(&graph, &mut overlay, request.mode, &request.force_restart);

      let unowned = if request.remove_unused_images && overlay.any_update() {
        unowned_images(runner)?
      } else {
        Vec::new()
      };

      let plan = build_plan(&PlanInputs {
        mode: request.mode,
        graph: &graph,
        overlay: &overlay,
        remove_unused_images: request.remove_unused_images,
        unowned_images: unowned,
      });
      debug!(steps = plan.len(), "plan computed");

      if !options.dry_run {
        if plan.is_empty() {
          store.delete()?;
        } else {
          store.save(&plan)?;
        }
      }
      plan
    }
  };

  let dry = DryRunRunner;
  let effects: &dyn CommandRunner = if options.dry_run { &dry } else { runner };
  let checkpointing = if options.dry_run { None } else { Some(&store) };

  let engine = Engine::new(effects, runner, checkpointing);
  let report = engine.execute(&mut plan)?;

  Ok(ReconcileReport {
    changed: !report.executed.is_empty(),
    executed: report.executed,
    failure: report.failure,
    remaining: plan.steps,
  })
}

/// Drift summary for one declared container, for diagnostics.
#[derive(Debug)]
pub struct ContainerReport {
  pub name: String,
  pub status: ContainerStatus,
  pub deployed_commit: Option<String>,
  pub latest_commit: Option<String>,
  pub update: bool,
}

/// Observe and decide without planning or executing anything.
pub fn survey(
  request: &ReconcileRequest,
  runner: &dyn CommandRunner,
  fetcher: &dyn ManifestFetcher,
) -> Result<Vec<ContainerReport>, ReconcileError> {
  let specs = normalize_all(&request.containers)?;
  let graph = DependencyGraph::build(specs)?;
  let mut overlay = observe(&graph, runner, fetcher)?;
  decide(&graph, &mut overlay, request.mode, &request.force_restart);

  Ok(
    (0..graph.len())
      .map(|position| {
        let state = overlay.state(position);
        ContainerReport {
          name: graph.spec(position).name.clone(),
          status: state.status,
          deployed_commit: state.deployed_commit.clone(),
          latest_commit: state.latest_commit.clone(),
          update: state.update,
        }
      })
      .collect(),
  )
}
