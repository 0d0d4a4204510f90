//! Container declarations and their canonical form.
//!
//! A raw [`ContainerSpec`] is whatever the invoking automation handed us.
//! Normalization keeps only recognized attributes, sorts every list-valued
//! field by its semantic key, and canonicalizes the image reference, so two
//! declarations that differ only in ordering produce identical fingerprints.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::{Fingerprint, fingerprint_of};

/// Default tag applied when a declaration names an image without one.
const DEFAULT_TAG: &str = "latest";

/// Fatal input errors. None of these leave any effect behind.
#[derive(Debug, Error)]
pub enum SpecError {
  #[error("container '{container}': {message}")]
  Malformed { container: String, message: String },

  #[error("duplicate container name '{0}'")]
  DuplicateName(String),

  #[error("invalid image reference '{0}'")]
  InvalidImage(String),

  #[error("force_restart['{name}']: cannot parse '{value}' as a boolean")]
  InvalidOverride { name: String, value: String },
}

/// Target mode for a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  /// Containers pulled, patched, and running.
  Present,
  /// Images pulled and patched, nothing started or stopped.
  Prepared,
  /// Containers stopped and removed.
  Absent,
}

impl Mode {
  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Present => "present",
      Mode::Prepared => "prepared",
      Mode::Absent => "absent",
    }
  }
}

impl std::fmt::Display for Mode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

fn default_mode() -> Mode {
  Mode::Present
}

/// The marshalled input document: everything one reconciliation needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
  #[serde(default = "default_mode")]
  pub state: Mode,

  pub containers: Vec<ContainerSpec>,

  /// Per-container restart overrides. Values may be booleans or the
  /// bool-ish strings automation tools tend to produce.
  #[serde(default)]
  pub force_restart: BTreeMap<String, serde_json::Value>,

  /// Whether to reap images left unowned after this run.
  #[serde(default)]
  pub remove_unused_images: bool,
}

impl Deployment {
  /// Parse the force-restart map into plain booleans.
  ///
  /// Accepts JSON booleans and the strings true/1/t/y/yes and
  /// false/0/f/n/no, case-insensitive. Anything else is a fatal input error.
  pub fn parsed_overrides(&self) -> Result<BTreeMap<String, bool>, SpecError> {
    let mut parsed = BTreeMap::new();
    for (name, value) in &self.force_restart {
      parsed.insert(name.clone(), parse_bool_flag(name, value)?);
    }
    Ok(parsed)
  }
}

fn parse_bool_flag(name: &str, value: &serde_json::Value) -> Result<bool, SpecError> {
  match value {
    serde_json::Value::Bool(b) => Ok(*b),
    serde_json::Value::String(s) => match s.to_lowercase().as_str() {
      "true" | "1" | "t" | "y" | "yes" => Ok(true),
      "false" | "0" | "f" | "n" | "no" => Ok(false),
      _ => Err(SpecError::InvalidOverride {
        name: name.to_string(),
        value: s.clone(),
      }),
    },
    other => Err(SpecError::InvalidOverride {
      name: name.to_string(),
      value: other.to_string(),
    }),
  }
}

/// One declared container, as handed to us by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
  pub name: String,
  pub image: String,

  #[serde(default)]
  pub daemon: bool,

  #[serde(default)]
  pub ports: Vec<PortMapping>,

  #[serde(default)]
  pub volumes: Vec<VolumeMount>,

  #[serde(default)]
  pub volumes_from: Vec<String>,

  #[serde(default)]
  pub links: Vec<Link>,

  #[serde(default, alias = "environment_variables")]
  pub env: BTreeMap<String, String>,

  /// Ordered image patch operations, applied on top of the pulled image.
  #[serde(default)]
  pub patches: Vec<PatchOp>,

  /// Extra `docker run` options, passed through verbatim.
  #[serde(default)]
  pub extra_options: Vec<String>,

  /// Positional arguments appended after the image.
  #[serde(default)]
  pub args: Vec<String>,

  /// Raw start command, replacing the synthesized `docker run` entirely.
  #[serde(default)]
  pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
  pub host: String,
  pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
  pub host: String,
  pub container: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub name: String,
  pub alias: String,
}

/// One image patch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
  /// Append a run instruction with the literal command text.
  Run { command: String },
  /// Copy a host path into the image at the given destination.
  Add { host: PathBuf, image: String },
}

/// A parsed image reference: `[registry/]repository[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
  /// Registry host, only when the reference names one explicitly.
  pub registry: Option<String>,
  pub repository: String,
  pub tag: String,
}

impl ImageRef {
  pub fn parse(reference: &str) -> Result<Self, SpecError> {
    if reference.is_empty() {
      return Err(SpecError::InvalidImage(reference.to_string()));
    }

    // A first path segment with a dot, a colon, or "localhost" is a
    // registry host; anything else is part of the repository.
    let (registry, rest) = match reference.split_once('/') {
      Some((head, rest)) if head.contains('.') || head.contains(':') || head == "localhost" => {
        (Some(head.to_string()), rest)
      }
      _ => (None, reference),
    };

    // The tag separator is a colon after the last slash.
    let (repository, tag) = match rest.rsplit_once(':') {
      Some((repo, tag)) if !tag.contains('/') => (repo, tag),
      _ => (rest, DEFAULT_TAG),
    };

    if repository.is_empty() || tag.is_empty() {
      return Err(SpecError::InvalidImage(reference.to_string()));
    }

    Ok(Self {
      registry,
      repository: repository.to_string(),
      tag: tag.to_string(),
    })
  }

  /// The full reference, tag always explicit.
  pub fn canonical(&self) -> String {
    match &self.registry {
      Some(registry) => format!("{}/{}:{}", registry, self.repository, self.tag),
      None => format!("{}:{}", self.repository, self.tag),
    }
  }
}

impl std::fmt::Display for ImageRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.canonical())
  }
}

/// The canonical form of a container declaration.
///
/// Field order and the `BTreeMap` env make serialization deterministic;
/// this struct is what config fingerprints are computed over.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSpec {
  pub name: String,
  pub image: ImageRef,
  pub daemon: bool,
  pub ports: Vec<PortMapping>,
  pub volumes: Vec<VolumeMount>,
  pub volumes_from: Vec<String>,
  pub links: Vec<Link>,
  pub env: BTreeMap<String, String>,
  pub patches: Vec<PatchOp>,
  pub extra_options: Vec<String>,
  pub args: Vec<String>,
  pub command: Option<Vec<String>>,
}

impl NormalizedSpec {
  /// Fingerprint of this spec's declared configuration.
  pub fn config_fingerprint(&self) -> Fingerprint {
    fingerprint_of(self)
  }

  /// The image name the start phase will reference: the canonical image,
  /// or the derived patched name when patch operations are declared.
  pub fn start_image(&self) -> String {
    if self.patches.is_empty() {
      self.image.canonical()
    } else {
      format!("{}_{}", self.image.canonical(), fingerprint_of(&self.patches))
    }
  }
}

/// Normalize one declaration. Malformed entries are fatal.
pub fn normalize(spec: &ContainerSpec) -> Result<NormalizedSpec, SpecError> {
  let malformed = |message: &str| SpecError::Malformed {
    container: spec.name.clone(),
    message: message.to_string(),
  };

  if spec.name.is_empty() {
    return Err(SpecError::Malformed {
      container: "<unnamed>".to_string(),
      message: "container name must not be empty".to_string(),
    });
  }

  for port in &spec.ports {
    if port.host.is_empty() || port.container.is_empty() {
      return Err(malformed("port mappings need both host and container"));
    }
  }
  for volume in &spec.volumes {
    if volume.container.is_empty() {
      return Err(malformed("volume mounts need a container path"));
    }
  }
  for link in &spec.links {
    if link.name.is_empty() || link.alias.is_empty() {
      return Err(malformed("links need both name and alias"));
    }
  }
  for patch in &spec.patches {
    match patch {
      PatchOp::Run { command } if command.is_empty() => {
        return Err(malformed("patch run op has an empty command"));
      }
      PatchOp::Add { host, image } if host.as_os_str().is_empty() || image.is_empty() => {
        return Err(malformed("patch add op needs host and image paths"));
      }
      _ => {}
    }
  }
  if spec.command.as_ref().is_some_and(|c| c.is_empty()) {
    return Err(malformed("raw command must not be empty"));
  }

  let mut ports = spec.ports.clone();
  ports.sort_by(|a, b| a.container.cmp(&b.container));

  let mut volumes = spec.volumes.clone();
  volumes.sort_by(|a, b| a.container.cmp(&b.container));

  let mut links = spec.links.clone();
  links.sort_by(|a, b| a.alias.cmp(&b.alias));

  let mut volumes_from = spec.volumes_from.clone();
  volumes_from.sort();

  Ok(NormalizedSpec {
    name: spec.name.clone(),
    image: ImageRef::parse(&spec.image)?,
    daemon: spec.daemon,
    ports,
    volumes,
    volumes_from,
    links,
    env: spec.env.clone(),
    patches: spec.patches.clone(),
    extra_options: spec.extra_options.clone(),
    args: spec.args.clone(),
    command: spec.command.clone(),
  })
}

/// Normalize a whole declaration, rejecting duplicate names.
pub fn normalize_all(specs: &[ContainerSpec]) -> Result<Vec<NormalizedSpec>, SpecError> {
  let mut seen = BTreeSet::new();
  let mut normalized = Vec::with_capacity(specs.len());

  for spec in specs {
    if !seen.insert(spec.name.clone()) {
      return Err(SpecError::DuplicateName(spec.name.clone()));
    }
    normalized.push(normalize(spec)?);
  }

  Ok(normalized)
}

/// Fingerprint of the full desired state: mode plus every normalized spec,
/// in declaration order. Observed runtime state never contributes.
pub fn desired_state_fingerprint(mode: Mode, specs: &[NormalizedSpec]) -> Fingerprint {
  fingerprint_of(&(mode.as_str(), specs))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::spec;

  #[test]
  fn image_ref_bare_name() {
    let image = ImageRef::parse("nginx").unwrap();
    assert_eq!(image.registry, None);
    assert_eq!(image.repository, "nginx");
    assert_eq!(image.tag, "latest");
    assert_eq!(image.canonical(), "nginx:latest");
  }

  #[test]
  fn image_ref_with_registry_and_tag() {
    let image = ImageRef::parse("registry.example.com:5000/app/web:1.2").unwrap();
    assert_eq!(image.registry.as_deref(), Some("registry.example.com:5000"));
    assert_eq!(image.repository, "app/web");
    assert_eq!(image.tag, "1.2");
    assert_eq!(image.canonical(), "registry.example.com:5000/app/web:1.2");
  }

  #[test]
  fn image_ref_namespaced_without_registry() {
    let image = ImageRef::parse("library/redis:7").unwrap();
    assert_eq!(image.registry, None);
    assert_eq!(image.repository, "library/redis");
    assert_eq!(image.tag, "7");
  }

  #[test]
  fn image_ref_localhost_registry() {
    let image = ImageRef::parse("localhost/thing").unwrap();
    assert_eq!(image.registry.as_deref(), Some("localhost"));
    assert_eq!(image.repository, "thing");
  }

  #[test]
  fn image_ref_empty_is_invalid() {
    assert!(matches!(ImageRef::parse(""), Err(SpecError::InvalidImage(_))));
  }

  #[test]
  fn normalization_sorts_list_fields() {
    let mut raw = spec("web", "nginx");
    raw.ports = vec![
      PortMapping { host: "9090".into(), container: "90".into() },
      PortMapping { host: "8080".into(), container: "80".into() },
    ];
    raw.links = vec![
      Link { name: "db".into(), alias: "zeta".into() },
      Link { name: "cache".into(), alias: "alpha".into() },
    ];
    raw.volumes_from = vec!["data2".into(), "data1".into()];

    let normalized = normalize(&raw).unwrap();
    assert_eq!(normalized.ports[0].container, "80");
    assert_eq!(normalized.links[0].alias, "alpha");
    assert_eq!(normalized.volumes_from, vec!["data1", "data2"]);
  }

  #[test]
  fn list_order_does_not_affect_fingerprint() {
    let mut first = spec("web", "nginx");
    first.ports = vec![
      PortMapping { host: "9090".into(), container: "90".into() },
      PortMapping { host: "8080".into(), container: "80".into() },
    ];

    let mut second = first.clone();
    second.ports.reverse();

    let fp_first = normalize(&first).unwrap().config_fingerprint();
    let fp_second = normalize(&second).unwrap().config_fingerprint();
    assert_eq!(fp_first, fp_second);
  }

  #[test]
  fn changed_field_changes_fingerprint() {
    let first = normalize(&spec("web", "nginx")).unwrap();
    let second = normalize(&spec("web", "nginx:1.25")).unwrap();
    assert_ne!(first.config_fingerprint(), second.config_fingerprint());
  }

  #[test]
  fn start_image_without_patches_is_canonical() {
    let normalized = normalize(&spec("web", "registry.example.com/app/web:1.2")).unwrap();
    assert_eq!(normalized.start_image(), "registry.example.com/app/web:1.2");
  }

  #[test]
  fn start_image_with_patches_embeds_patch_fingerprint() {
    let mut raw = spec("web", "nginx:1.25");
    raw.patches = vec![PatchOp::Run { command: "echo x".into() }];
    let normalized = normalize(&raw).unwrap();

    let start = normalized.start_image();
    assert!(start.starts_with("nginx:1.25_"));

    // Changing either op changes the tag.
    let mut other = raw.clone();
    other.patches = vec![PatchOp::Run { command: "echo y".into() }];
    assert_ne!(start, normalize(&other).unwrap().start_image());
  }

  #[test]
  fn duplicate_names_are_fatal() {
    let specs = vec![spec("web", "nginx"), spec("web", "redis")];
    assert!(matches!(normalize_all(&specs), Err(SpecError::DuplicateName(_))));
  }

  #[test]
  fn empty_name_is_fatal() {
    let raw = spec("", "nginx");
    assert!(matches!(normalize(&raw), Err(SpecError::Malformed { .. })));
  }

  #[test]
  fn desired_fingerprint_covers_mode() {
    let specs = vec![normalize(&spec("web", "nginx")).unwrap()];
    let present = desired_state_fingerprint(Mode::Present, &specs);
    let absent = desired_state_fingerprint(Mode::Absent, &specs);
    assert_ne!(present, absent);
  }

  #[test]
  fn override_parsing_accepts_boolish_strings() {
    let deployment: Deployment = serde_json::from_value(serde_json::json!({
      "containers": [],
      "force_restart": { "a": true, "b": "YES", "c": "0", "d": "no" }
    }))
    .unwrap();

    let parsed = deployment.parsed_overrides().unwrap();
    assert_eq!(parsed["a"], true);
    assert_eq!(parsed["b"], true);
    assert_eq!(parsed["c"], false);
    assert_eq!(parsed["d"], false);
  }

  #[test]
  fn override_parsing_rejects_garbage() {
    let deployment: Deployment = serde_json::from_value(serde_json::json!({
      "containers": [],
      "force_restart": { "a": "maybe" }
    }))
    .unwrap();

    assert!(matches!(
      deployment.parsed_overrides(),
      Err(SpecError::InvalidOverride { .. })
    ));
  }

  #[test]
  fn deployment_defaults() {
    let deployment: Deployment =
      serde_json::from_value(serde_json::json!({ "containers": [] })).unwrap();
    assert_eq!(deployment.state, Mode::Present);
    assert!(!deployment.remove_unused_images);
  }
}
