//! Container runtime capability.
//!
//! [`ContainerRuntime`] is the boundary between dockernel and the container
//! engine. The orchestrator only talks to this trait, so it can be driven by
//! [`DockerCli`] in production and by a fake in tests.
//!
//! # Lifecycle
//!
//! ```text
//! image(name) → create_and_run(spec) → wait(handle) ─┬─ Exited(code)
//!                                                    └─ Interrupted(sig) → stop → [kill] → remove
//! ```

pub mod docker;

pub use docker::DockerCli;

use crate::error::Result;
use crate::launch::ContainerLaunchSpec;
use crate::shutdown::Shutdown;
use std::time::Duration;

/// Image metadata returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Content id, e.g. `sha256:4f0c...`.
    pub id: String,
}

impl ImageInfo {
    /// First 12 hex characters of the content id.
    pub fn short_id(&self) -> &str {
        let hex = self
            .id
            .split_once(':')
            .map(|(_, digest)| digest)
            .unwrap_or(&self.id);
        hex.get(..12).unwrap_or(hex)
    }
}

/// A created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    /// Runtime container id.
    pub id: String,
}

impl ContainerHandle {
    /// Wrap a runtime container id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// How a wait on a container ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The container's process exited with this code.
    Exited(i64),
    /// Dockernel received this termination signal first.
    Interrupted(i32),
}

/// Operations dockernel needs from a container engine.
pub trait ContainerRuntime {
    /// Short runtime name for logging.
    fn name(&self) -> &str;

    /// Look up an image.
    ///
    /// Fails with [`Error::ImageNotFound`](crate::Error::ImageNotFound) if the
    /// image is absent and [`Error::RuntimeUnavailable`](crate::Error::RuntimeUnavailable)
    /// if the engine can't be reached.
    fn image(&self, name: &str) -> Result<ImageInfo>;

    /// Create a container from `spec` and start it, streaming its output.
    fn create_and_run(&self, spec: &ContainerLaunchSpec) -> Result<ContainerHandle>;

    /// Block until the container exits or `shutdown` fires.
    fn wait(&self, handle: &ContainerHandle, shutdown: &Shutdown) -> Result<WaitStatus>;

    /// Ask the container to stop within `grace`.
    ///
    /// Returns `true` once the runtime confirms the container stopped, `false`
    /// if no confirmation arrived within the grace period.
    fn stop(&self, handle: &ContainerHandle, grace: Duration) -> Result<bool>;

    /// Kill the container immediately.
    fn kill(&self, handle: &ContainerHandle) -> Result<()>;

    /// Remove the container. Removing a container that no longer exists succeeds.
    fn remove(&self, handle: &ContainerHandle) -> Result<()>;
}
