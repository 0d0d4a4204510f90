//! The inter-container dependency graph and its per-run decision overlay.
//!
//! The graph is immutable once built: one node per normalized spec, and a
//! reverse edge (dependency → dependent) for every `volumes_from` or `links`
//! reference. Everything mutable during a run — observed status, build
//! identities, the update flag — lives in the separate [`Overlay`], keyed by
//! declaration position.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use thiserror::Error;

use berth_docker::ContainerStatus;

use crate::spec::NormalizedSpec;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("container '{container}' references unknown container '{reference}' in {field}")]
  UnknownReference {
    container: String,
    reference: String,
    field: &'static str,
  },
}

/// Immutable dependency structure for one declaration.
pub struct DependencyGraph {
  specs: Vec<NormalizedSpec>,
  graph: DiGraph<usize, ()>,
  indices: Vec<NodeIndex>,
  by_name: HashMap<String, usize>,
}

impl DependencyGraph {
  /// Build the graph. Every reference must resolve to a declared name;
  /// an unresolved reference fails before the graph is returned.
  pub fn build(specs: Vec<NormalizedSpec>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut indices = Vec::with_capacity(specs.len());
    let mut by_name = HashMap::new();

    for (position, spec) in specs.iter().enumerate() {
      indices.push(graph.add_node(position));
      by_name.insert(spec.name.clone(), position);
    }

    for (position, spec) in specs.iter().enumerate() {
      for provider in &spec.volumes_from {
        let dep = *by_name.get(provider).ok_or_else(|| GraphError::UnknownReference {
          container: spec.name.clone(),
          reference: provider.clone(),
          field: "volumes_from",
        })?;
        graph.add_edge(indices[dep], indices[position], ());
      }

      for link in &spec.links {
        let dep = *by_name.get(&link.name).ok_or_else(|| GraphError::UnknownReference {
          container: spec.name.clone(),
          reference: link.name.clone(),
          field: "links",
        })?;
        graph.add_edge(indices[dep], indices[position], ());
      }
    }

    Ok(Self {
      specs,
      graph,
      indices,
      by_name,
    })
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }

  /// Specs in declaration order.
  pub fn specs(&self) -> &[NormalizedSpec] {
    &self.specs
  }

  pub fn spec(&self, position: usize) -> &NormalizedSpec {
    &self.specs[position]
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.by_name.get(name).copied()
  }

  /// Containers that directly require the given one.
  pub fn direct_dependents(&self, position: usize) -> Vec<usize> {
    self
      .graph
      .neighbors_directed(self.indices[position], Direction::Outgoing)
      .map(|idx| self.graph[idx])
      .collect()
  }

  /// Every container reachable over requiredBy edges, however deep.
  ///
  /// The walk tracks visited nodes, so cyclic declarations terminate.
  pub fn transitive_dependents(&self, position: usize) -> Vec<usize> {
    let mut dependents = Vec::new();
    let mut dfs = Dfs::new(&self.graph, self.indices[position]);
    while let Some(idx) = dfs.next(&self.graph) {
      let found = self.graph[idx];
      if found != position {
        dependents.push(found);
      }
    }
    dependents
  }
}

/// Per-run mutable state for one container, parallel to the graph.
#[derive(Debug, Clone)]
pub struct NodeState {
  /// Observed lifecycle state.
  pub status: ContainerStatus,
  /// Commit label on the deployed container, when present.
  pub deployed_commit: Option<String>,
  /// Config fingerprint label on the deployed container, when present.
  pub deployed_config: Option<String>,
  /// Newest commit label available for the image, when determinable.
  pub latest_commit: Option<String>,
  /// Whether this container must be updated in this run.
  pub update: bool,
}

impl Default for NodeState {
  fn default() -> Self {
    Self {
      status: ContainerStatus::Absent,
      deployed_commit: None,
      deployed_config: None,
      latest_commit: None,
      update: false,
    }
  }
}

/// The decision overlay: one [`NodeState`] per graph node.
#[derive(Debug, Clone)]
pub struct Overlay {
  states: Vec<NodeState>,
}

impl Overlay {
  pub fn new(len: usize) -> Self {
    Self {
      states: vec![NodeState::default(); len],
    }
  }

  pub fn state(&self, position: usize) -> &NodeState {
    &self.states[position]
  }

  pub fn state_mut(&mut self, position: usize) -> &mut NodeState {
    &mut self.states[position]
  }

  /// Whether any container was flagged for update.
  pub fn any_update(&self) -> bool {
    self.states.iter().any(|s| s.update)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::spec::{Link, normalize};
  use crate::testutil::spec;

  fn graph_of(raw: Vec<crate::spec::ContainerSpec>) -> Result<DependencyGraph, GraphError> {
    let specs = raw.iter().map(|s| normalize(s).unwrap()).collect();
    DependencyGraph::build(specs)
  }

  #[test]
  fn no_references_means_no_edges() {
    let graph = graph_of(vec![spec("a", "img"), spec("b", "img")]).unwrap();
    assert_eq!(graph.len(), 2);
    assert!(graph.direct_dependents(0).is_empty());
    assert!(graph.direct_dependents(1).is_empty());
  }

  #[test]
  fn link_creates_reverse_edge() {
    let mut b = spec("b", "img");
    b.links = vec![Link { name: "a".into(), alias: "a".into() }];

    let graph = graph_of(vec![spec("a", "img"), b]).unwrap();
    assert_eq!(graph.direct_dependents(0), vec![1]);
    assert!(graph.direct_dependents(1).is_empty());
  }

  #[test]
  fn volumes_from_creates_reverse_edge() {
    let mut b = spec("b", "img");
    b.volumes_from = vec!["a".into()];

    let graph = graph_of(vec![spec("a", "img"), b]).unwrap();
    assert_eq!(graph.direct_dependents(0), vec![1]);
  }

  #[test]
  fn transitive_dependents_follow_chains() {
    // c links b, b links a: marking a must reach c.
    let mut b = spec("b", "img");
    b.links = vec![Link { name: "a".into(), alias: "a".into() }];
    let mut c = spec("c", "img");
    c.links = vec![Link { name: "b".into(), alias: "b".into() }];

    let graph = graph_of(vec![spec("a", "img"), b, c]).unwrap();
    let mut dependents = graph.transitive_dependents(0);
    dependents.sort();
    assert_eq!(dependents, vec![1, 2]);
  }

  #[test]
  fn cyclic_declaration_terminates() {
    let mut a = spec("a", "img");
    a.links = vec![Link { name: "b".into(), alias: "b".into() }];
    let mut b = spec("b", "img");
    b.links = vec![Link { name: "a".into(), alias: "a".into() }];

    let graph = graph_of(vec![a, b]).unwrap();
    assert_eq!(graph.transitive_dependents(0), vec![1]);
    assert_eq!(graph.transitive_dependents(1), vec![0]);
  }

  #[test]
  fn unknown_link_reference_is_fatal() {
    let mut b = spec("b", "img");
    b.links = vec![Link { name: "ghost".into(), alias: "g".into() }];

    let result = graph_of(vec![spec("a", "img"), b]);
    assert!(matches!(result, Err(GraphError::UnknownReference { field: "links", .. })));
  }

  #[test]
  fn unknown_volumes_from_reference_is_fatal() {
    let mut b = spec("b", "img");
    b.volumes_from = vec!["ghost".into()];

    let result = graph_of(vec![b]);
    assert!(matches!(
      result,
      Err(GraphError::UnknownReference { field: "volumes_from", .. })
    ));
  }

  #[test]
  fn position_resolves_names() {
    let graph = graph_of(vec![spec("a", "img"), spec("b", "img")]).unwrap();
    assert_eq!(graph.position("b"), Some(1));
    assert_eq!(graph.position("ghost"), None);
  }
}
