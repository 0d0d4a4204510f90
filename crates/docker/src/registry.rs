//! Registry manifest fetching.
//!
//! Fetches a v2 schema-1 manifest for an image and exposes the labels buried
//! in its embedded v1-compatibility config. Callers are expected to treat
//! every error here as recoverable: the reconciler falls back to inspecting
//! the locally resolved image instead.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const MANIFEST_V1_JSON: &str = "application/vnd.docker.distribution.manifest.v1+json";
const MANIFEST_V1_JWS: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("manifest request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("registry returned status {status} for {url}")]
  Status { status: u16, url: String },

  #[error("failed to parse manifest: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("manifest for {image} has no history entries")]
  EmptyHistory { image: String },
}

/// A v2 schema-1 image manifest.
///
/// Only the pieces we read are modeled; the first history entry carries the
/// full image config as an embedded JSON string.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageManifest {
  #[serde(default)]
  pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
  #[serde(rename = "v1Compatibility")]
  pub v1_compatibility: String,
}

#[derive(Debug, Deserialize)]
struct V1Config {
  #[serde(default)]
  config: Option<ContainerConfig>,
}

#[derive(Debug, Deserialize)]
struct ContainerConfig {
  #[serde(rename = "Labels", default)]
  labels: Option<std::collections::BTreeMap<String, String>>,
}

impl ImageManifest {
  /// Read a label from the image config embedded in the newest history entry.
  ///
  /// Returns `Err` when the manifest has no history or the compatibility
  /// blob does not parse; returns `Ok(None)` when the label is simply absent.
  pub fn config_label(&self, image: &str, label: &str) -> Result<Option<String>, RegistryError> {
    let entry = self.history.first().ok_or_else(|| RegistryError::EmptyHistory {
      image: image.to_string(),
    })?;
    let config: V1Config = serde_json::from_str(&entry.v1_compatibility)?;
    Ok(
      config
        .config
        .and_then(|c| c.labels)
        .and_then(|mut labels| labels.remove(label)),
    )
  }
}

/// Fetches the parsed manifest for registry/repository:tag.
pub trait ManifestFetcher {
  fn fetch(&self, registry: &str, repository: &str, tag: &str) -> Result<ImageManifest, RegistryError>;
}

/// Blocking HTTP manifest fetcher against the v2 registry API.
pub struct HttpManifestFetcher {
  client: reqwest::blocking::Client,
}

impl HttpManifestFetcher {
  pub fn new() -> Self {
    Self {
      client: reqwest::blocking::Client::new(),
    }
  }

  /// Registries are normally addressed by bare host[:port]; tests and
  /// plaintext registries may pass a full URL instead.
  fn base_url(registry: &str) -> String {
    if registry.contains("://") {
      registry.trim_end_matches('/').to_string()
    } else {
      format!("https://{}", registry)
    }
  }
}

impl Default for HttpManifestFetcher {
  fn default() -> Self {
    Self::new()
  }
}

impl ManifestFetcher for HttpManifestFetcher {
  fn fetch(&self, registry: &str, repository: &str, tag: &str) -> Result<ImageManifest, RegistryError> {
    let url = format!("{}/v2/{}/manifests/{}", Self::base_url(registry), repository, tag);
    debug!(%url, "fetching manifest");

    let response = self
      .client
      .get(&url)
      .header("Accept", format!("{}, {}", MANIFEST_V1_JSON, MANIFEST_V1_JWS))
      .send()?;

    if !response.status().is_success() {
      return Err(RegistryError::Status {
        status: response.status().as_u16(),
        url,
      });
    }

    let body = response.text()?;
    let manifest: ImageManifest = serde_json::from_str(&body)?;
    Ok(manifest)
  }
}
