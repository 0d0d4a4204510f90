//! berth-docker: the host effector layer for berth.
//!
//! Everything that touches the outside world lives here: running the docker
//! client as a subprocess, extracting single fields from `docker inspect`,
//! and fetching image manifests from a registry. The reconciliation logic in
//! `berth-core` only sees the traits exported from this crate, which keeps it
//! testable without a docker daemon.

pub mod exec;
pub mod inspect;
pub mod registry;

pub use exec::{CmdOutput, CommandRunner, DryRunRunner, ExecError, SystemRunner};
pub use inspect::{ContainerStatus, Introspector};
pub use registry::{HttpManifestFetcher, ImageManifest, ManifestFetcher, RegistryError};
