//! Runtime observation: fill the decision overlay from the live host.
//!
//! For every declared container we record its lifecycle status and the two
//! identity labels on the deployed container, then resolve the newest commit
//! available for its image. Images on an explicit registry are resolved over
//! the registry API; everything else, and every registry failure, falls back
//! to the label on the locally resolved image.

use tracing::debug;

use berth_docker::{CommandRunner, ExecError, Introspector, ManifestFetcher};

use crate::graph::{DependencyGraph, Overlay};
use crate::spec::NormalizedSpec;

/// Label carrying the build identity an image was produced from.
pub const COMMIT_LABEL: &str = "commitId";

/// Label carrying the config fingerprint a container was started with.
pub const CONFIG_LABEL: &str = "configHash";

/// Observe the host and return a populated overlay for the graph.
///
/// Only spawn failures propagate; a missing container, missing label, or
/// unreachable registry is ordinary observed state, not an error.
pub fn observe(
  graph: &DependencyGraph,
  runner: &dyn CommandRunner,
  fetcher: &dyn ManifestFetcher,
) -> Result<Overlay, ExecError> {
  let introspector = Introspector::new(runner);
  let mut overlay = Overlay::new(graph.len());

  for (position, spec) in graph.specs().iter().enumerate() {
    let state = overlay.state_mut(position);
    state.status = introspector.container_status(&spec.name)?;
    if state.status.exists() {
      state.deployed_commit = introspector.label(&spec.name, COMMIT_LABEL)?;
      state.deployed_config = introspector.label(&spec.name, CONFIG_LABEL)?;
    }
    state.latest_commit = latest_commit(spec, &introspector, fetcher)?;
  }

  Ok(overlay)
}

/// The newest commit label reachable for this spec's image.
fn latest_commit(
  spec: &NormalizedSpec,
  introspector: &Introspector<'_>,
  fetcher: &dyn ManifestFetcher,
) -> Result<Option<String>, ExecError> {
  if let Some(registry) = &spec.image.registry {
    match fetcher
      .fetch(registry, &spec.image.repository, &spec.image.tag)
      .and_then(|manifest| manifest.config_label(&spec.image.canonical(), COMMIT_LABEL))
    {
      Ok(label) => return Ok(label),
      Err(err) => {
        debug!(image = %spec.image, error = %err, "registry lookup failed, using local image label");
      }
    }
  }
  introspector.label(&spec.image.canonical(), COMMIT_LABEL)
}

/// Ids of images no existing container references.
pub fn unowned_images(runner: &dyn CommandRunner) -> Result<Vec<String>, ExecError> {
  let introspector = Introspector::new(runner);
  let owned = introspector.owned_image_ids()?;
  let mut unowned = introspector.all_image_ids()?;
  unowned.retain(|id| !owned.contains(id));
  Ok(unowned)
}
