//! berth-core: container reconciliation for a single host.
//!
//! Given a declared deployment (an ordered list of container specs and a
//! target mode), berth computes the minimal ordered sequence of stop, pull,
//! patch-build, start, and cleanup operations, persists that plan, and
//! executes it one checkpointed step at a time. A run that is interrupted
//! resumes exactly where it stopped; a deployment that matches observed
//! state produces an empty plan.
//!
//! Flow: [`spec`] normalizes the declaration → [`graph`] links containers via
//! shared volumes and links → [`inspect`] observes the runtime → [`decide`]
//! flags drifted containers and cascades to dependents → [`plan`] synthesizes
//! the step list → [`store`] persists it → [`engine`] consumes it. The whole
//! pipeline is driven by [`reconcile::reconcile`].

pub mod decide;
pub mod engine;
pub mod fingerprint;
pub mod graph;
pub mod inspect;
pub mod plan;
pub mod reconcile;
pub mod spec;
pub mod store;

#[cfg(test)]
pub mod testutil;

pub use decide::{decide, should_update};
pub use engine::{Engine, EngineError, ExecutionReport, StepFailure};
pub use fingerprint::{Fingerprint, fingerprint_of};
pub use graph::{DependencyGraph, GraphError, NodeState, Overlay};
pub use inspect::{observe, unowned_images};
pub use plan::{Plan, PlanInputs, Step, build_plan, build_start_argv};
pub use reconcile::{
  ContainerReport, ReconcileError, ReconcileOptions, ReconcileReport, ReconcileRequest, reconcile, survey,
};
pub use spec::{
  ContainerSpec, Deployment, ImageRef, Mode, NormalizedSpec, PatchOp, SpecError, desired_state_fingerprint,
  normalize, normalize_all,
};
pub use store::{PlanStore, PlanStoreError};
