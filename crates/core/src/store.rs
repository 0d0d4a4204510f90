//! Plan persistence.
//!
//! The plan file is the only durable state this system keeps. Its absence is
//! the converged state; its presence means a run is in flight. Every write is
//! atomic (write to temp, then rename) so an interrupted checkpoint can never
//! leave a half-written plan behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::plan::Plan;

#[derive(Debug, Error)]
pub enum PlanStoreError {
  #[error("failed to read plan file: {0}")]
  Read(io::Error),

  #[error("failed to parse plan file: {0}")]
  Parse(serde_json::Error),

  #[error("failed to serialize plan: {0}")]
  Serialize(serde_json::Error),

  #[error("failed to write plan file: {0}")]
  Write(io::Error),

  #[error("failed to delete plan file: {0}")]
  Delete(io::Error),
}

/// Reads and checkpoints the persisted plan at one fixed path.
pub struct PlanStore {
  path: PathBuf,
}

impl PlanStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the persisted plan. A missing file is `Ok(None)`.
  pub fn load(&self) -> Result<Option<Plan>, PlanStoreError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(PlanStoreError::Read(e)),
    };

    let plan: Plan = serde_json::from_str(&content).map_err(PlanStoreError::Parse)?;
    Ok(Some(plan))
  }

  /// Persist the plan, replacing whatever was there.
  pub fn save(&self, plan: &Plan) -> Result<(), PlanStoreError> {
    let temp_path = self.path.with_extension("tmp");

    let content = serde_json::to_string_pretty(plan).map_err(PlanStoreError::Serialize)?;
    fs::write(&temp_path, &content).map_err(PlanStoreError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(PlanStoreError::Write)?;

    debug!(path = %self.path.display(), steps = plan.len(), "plan persisted");
    Ok(())
  }

  /// Remove the plan file. Already gone is fine.
  pub fn delete(&self) -> Result<(), PlanStoreError> {
    match fs::remove_file(&self.path) {
      Ok(()) => {
        debug!(path = %self.path.display(), "plan deleted");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(PlanStoreError::Delete(e)),
    }
  }
}
