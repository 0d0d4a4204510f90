//! Shared test doubles for the reconciliation pipeline.

use std::cell::RefCell;
use std::collections::BTreeMap;

use berth_docker::{CmdOutput, CommandRunner, ExecError, ImageManifest, ManifestFetcher, RegistryError};

use crate::spec::ContainerSpec;

/// A minimal raw container declaration.
pub fn spec(name: &str, image: &str) -> ContainerSpec {
  ContainerSpec {
    name: name.to_string(),
    image: image.to_string(),
    daemon: false,
    ports: Vec::new(),
    volumes: Vec::new(),
    volumes_from: Vec::new(),
    links: Vec::new(),
    env: BTreeMap::new(),
    patches: Vec::new(),
    extra_options: Vec::new(),
    args: Vec::new(),
    command: None,
  }
}

pub fn ok_out(stdout: &str) -> CmdOutput {
  CmdOutput {
    status: 0,
    stdout: stdout.to_string(),
    stderr: String::new(),
  }
}

pub fn fail_out(stderr: &str) -> CmdOutput {
  CmdOutput {
    status: 1,
    stdout: String::new(),
    stderr: stderr.to_string(),
  }
}

/// Command runner that matches argv prefixes against programmed rules and
/// records every invocation. Unmatched commands succeed with empty output.
pub struct FakeRunner {
  pub calls: RefCell<Vec<Vec<String>>>,
  rules: RefCell<Vec<(Vec<String>, CmdOutput)>>,
}

impl FakeRunner {
  pub fn new() -> Self {
    Self {
      calls: RefCell::new(Vec::new()),
      rules: RefCell::new(Vec::new()),
    }
  }

  /// Respond to any command starting with `prefix`. Earlier rules win.
  pub fn on(&self, prefix: &[&str], output: CmdOutput) {
    self
      .rules
      .borrow_mut()
      .push((prefix.iter().map(|s| s.to_string()).collect(), output));
  }

  pub fn calls_matching(&self, prefix: &[&str]) -> usize {
    self
      .calls
      .borrow()
      .iter()
      .filter(|argv| starts_with(argv, prefix))
      .count()
  }

  pub fn call_log(&self) -> Vec<String> {
    self.calls.borrow().iter().map(|argv| argv.join(" ")).collect()
  }
}

fn starts_with(argv: &[String], prefix: &[&str]) -> bool {
  argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p)
}

impl CommandRunner for FakeRunner {
  fn run(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
    self.calls.borrow_mut().push(argv.to_vec());
    for (prefix, output) in self.rules.borrow().iter() {
      if argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p) {
        return Ok(output.clone());
      }
    }
    Ok(CmdOutput::ok())
  }
}

/// Manifest fetcher serving canned commit labels keyed by repository.
pub struct FakeFetcher {
  /// repository → commitId label value.
  pub commits: BTreeMap<String, String>,
  /// When set, every fetch fails with a transport-level error.
  pub fail: bool,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self {
      commits: BTreeMap::new(),
      fail: false,
    }
  }

  pub fn with_commit(repository: &str, commit: &str) -> Self {
    let mut fetcher = Self::new();
    fetcher.commits.insert(repository.to_string(), commit.to_string());
    fetcher
  }

  pub fn failing() -> Self {
    Self {
      commits: BTreeMap::new(),
      fail: true,
    }
  }
}

impl ManifestFetcher for FakeFetcher {
  fn fetch(&self, registry: &str, repository: &str, tag: &str) -> Result<ImageManifest, RegistryError> {
    if self.fail {
      return Err(RegistryError::Status {
        status: 503,
        url: format!("{}/v2/{}/manifests/{}", registry, repository, tag),
      });
    }

    let labels = match self.commits.get(repository) {
      Some(commit) => serde_json::json!({ "commitId": commit }),
      None => serde_json::json!({}),
    };
    let compat = serde_json::json!({ "config": { "Labels": labels } }).to_string();
    let body = serde_json::json!({ "history": [ { "v1Compatibility": compat } ] });
    let manifest: ImageManifest = serde_json::from_value(body).map_err(RegistryError::Parse)?;
    Ok(manifest)
  }
}
