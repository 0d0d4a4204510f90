//! The execution engine: consume a plan one checkpointed step at a time.
//!
//! Steps run front-to-back. After every success the step is removed and the
//! shortened plan is re-persisted before the next step begins; an empty plan
//! deletes the file, which is the sole convergence signal. A failed step
//! halts the engine and stays at the head of the persisted plan for the next
//! invocation. Every handler re-inspects runtime state at execution time, so
//! re-running a step that partially completed is always safe.
//!
//! Effects and queries go through separate runners: a dry run routes effects
//! through the no-op runner while inspections still hit the real host.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use berth_docker::{CommandRunner, ExecError, Introspector};

use crate::plan::{Plan, Step};
use crate::spec::PatchOp;
use crate::store::{PlanStore, PlanStoreError};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error(transparent)]
  Store(#[from] PlanStoreError),
}

/// One failed step: the step itself stays at the head of the persisted plan.
#[derive(Debug, Clone)]
pub struct StepFailure {
  pub step: Step,
  pub message: String,
}

/// What one engine pass did.
#[derive(Debug, Default)]
pub struct ExecutionReport {
  pub executed: Vec<Step>,
  pub failure: Option<StepFailure>,
}

impl ExecutionReport {
  pub fn changed(&self) -> bool {
    !self.executed.is_empty()
  }
}

enum StepError {
  /// The step's command failed; the run halts but the process is healthy.
  Failed(String),
  /// Spawn or checkpoint failure; propagates.
  Fatal(EngineError),
}

impl From<ExecError> for StepError {
  fn from(e: ExecError) -> Self {
    StepError::Fatal(EngineError::Exec(e))
  }
}

pub struct Engine<'a> {
  effects: &'a dyn CommandRunner,
  queries: &'a dyn CommandRunner,
  store: Option<&'a PlanStore>,
}

impl<'a> Engine<'a> {
  /// `store: None` disables checkpointing (dry runs).
  pub fn new(effects: &'a dyn CommandRunner, queries: &'a dyn CommandRunner, store: Option<&'a PlanStore>) -> Self {
    Self { effects, queries, store }
  }

  /// Run the plan to completion or first failure, checkpointing throughout.
  pub fn execute(&self, plan: &mut Plan) -> Result<ExecutionReport, EngineError> {
    let mut report = ExecutionReport::default();

    while let Some(step) = plan.steps.first().cloned() {
      info!(step = %step, "executing");
      match self.run_step(&step) {
        Ok(()) => {
          plan.steps.remove(0);
          self.checkpoint(plan)?;
          report.executed.push(step);
        }
        Err(StepError::Failed(message)) => {
          warn!(step = %step, %message, "step failed, halting");
          report.failure = Some(StepFailure { step, message });
          return Ok(report);
        }
        Err(StepError::Fatal(e)) => return Err(e),
      }
    }

    Ok(report)
  }

  fn checkpoint(&self, plan: &Plan) -> Result<(), EngineError> {
    let Some(store) = self.store else { return Ok(()) };
    if plan.is_empty() {
      store.delete()?;
    } else {
      store.save(plan)?;
    }
    Ok(())
  }

  fn run_step(&self, step: &Step) -> Result<(), StepError> {
    match step {
      Step::RunShellCommand { argv } => self.run_checked(argv),
      Step::PullImage { image } => self.pull_image(image),
      Step::PatchImage { base_image, patch_ops, result_image } => {
        self.patch_image(base_image, patch_ops, result_image)
      }
      Step::RemoveImages { candidate_ids, protect_images } => {
        self.remove_images(candidate_ids, protect_images)
      }
      Step::StopContainer { name } => self.stop_and_remove(name),
      Step::StartContainer { argv, name } => {
        self.stop_and_remove(name)?;
        self.run_checked(argv)
      }
    }
  }

  fn run_checked(&self, argv: &[String]) -> Result<(), StepError> {
    let out = self.effects.run(argv)?;
    if out.success() {
      Ok(())
    } else {
      Err(StepError::Failed(failure_message(&out.stderr, out.status)))
    }
  }

  /// Pull, tolerating registry unavailability for an image already cached.
  fn pull_image(&self, image: &str) -> Result<(), StepError> {
    let argv = vec!["docker".to_string(), "pull".to_string(), image.to_string()];
    let out = self.effects.run(&argv)?;
    if out.success() {
      return Ok(());
    }

    let introspector = Introspector::new(self.queries);
    if introspector.image_id(image)?.is_some() {
      debug!(%image, "pull failed but image resolves locally, continuing");
      return Ok(());
    }
    Err(StepError::Failed(failure_message(&out.stderr, out.status)))
  }

  /// Build the patched image in a transient context. The context directory
  /// is removed on every exit path when the guard drops.
  fn patch_image(&self, base_image: &str, patch_ops: &[PatchOp], result_image: &str) -> Result<(), StepError> {
    let context = tempfile::tempdir()
      .map_err(|e| StepError::Failed(format!("failed to create build context: {}", e)))?;

    let recipe = write_build_context(context.path(), base_image, patch_ops)
      .map_err(|e| StepError::Failed(format!("failed to stage build context: {}", e)))?;
    debug!(%result_image, recipe = %recipe, "staged build context");

    let argv = vec![
      "docker".to_string(),
      "build".to_string(),
      "-t".to_string(),
      result_image.to_string(),
      context.path().display().to_string(),
    ];
    self.run_checked(&argv)
  }

  /// Remove every candidate not resolving to a protected image. Protected
  /// names bind late: earlier steps in this plan may have just pulled them.
  fn remove_images(&self, candidate_ids: &[String], protect_images: &[String]) -> Result<(), StepError> {
    let introspector = Introspector::new(self.queries);

    let mut protected = Vec::new();
    for image in protect_images {
      if let Some(id) = introspector.image_id(image)? {
        protected.push(id);
      }
    }

    for id in candidate_ids {
      if protected.contains(id) {
        continue;
      }
      let argv = vec!["docker".to_string(), "rmi".to_string(), id.clone()];
      let out = self.effects.run(&argv)?;
      if !out.success() {
        warn!(image = %id, stderr = %out.stderr.trim(), "image removal failed, continuing");
      }
    }
    Ok(())
  }

  /// Stop if running, remove if present. Status is re-read here, not taken
  /// from plan-build time, so a partially applied prior attempt is fine.
  fn stop_and_remove(&self, name: &str) -> Result<(), StepError> {
    let introspector = Introspector::new(self.queries);
    let status = introspector.container_status(name)?;

    if status == berth_docker::ContainerStatus::Running {
      self.run_checked(&["docker".to_string(), "stop".to_string(), name.to_string()])?;
    }
    if status.exists() {
      self.run_checked(&["docker".to_string(), "rm".to_string(), name.to_string()])?;
    }
    Ok(())
  }
}

fn failure_message(stderr: &str, status: i32) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    format!("command exited with status {}", status)
  } else {
    stderr.to_string()
  }
}

/// Write the build recipe and copy `add` sources into the context.
/// Returns the recipe text.
fn write_build_context(context: &Path, base_image: &str, patch_ops: &[PatchOp]) -> io::Result<String> {
  let mut recipe = format!("FROM {}\n", base_image);

  for op in patch_ops {
    match op {
      PatchOp::Run { command } => {
        recipe.push_str(&format!("RUN {}\n", command));
      }
      PatchOp::Add { host, image } => {
        let name = host
          .file_name()
          .and_then(|n| n.to_str())
          .ok_or_else(|| io::Error::other(format!("add source {} has no file name", host.display())))?;
        copy_preserving(host, &context.join(name))?;
        recipe.push_str(&format!("ADD {} {}\n", name, image));
      }
    }
  }

  fs::write(context.join("Dockerfile"), &recipe)?;
  Ok(recipe)
}

/// Copy a file or tree, keeping permissions and mtimes so unchanged sources
/// keep hitting the builder's layer cache.
fn copy_preserving(src: &Path, dst: &Path) -> io::Result<()> {
  let metadata = fs::metadata(src)?;
  if !metadata.is_dir() {
    return copy_file_preserving(src, dst);
  }

  for entry in WalkDir::new(src) {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target)?;
      let meta = entry.metadata().map_err(io::Error::other)?;
      fs::set_permissions(&target, meta.permissions())?;
      filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&meta))?;
    } else {
      copy_file_preserving(entry.path(), &target)?;
    }
  }
  Ok(())
}

fn copy_file_preserving(src: &Path, dst: &Path) -> io::Result<()> {
  fs::copy(src, dst)?;
  let metadata = fs::metadata(src)?;
  filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))?;
  Ok(())
}
