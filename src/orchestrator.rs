//! Container lifecycle orchestration.
//!
//! [`run`] takes a built [`ContainerLaunchSpec`] through the runtime:
//!
//! 1. Look up the image (fails with `ImageNotFound` before anything is created)
//! 2. Create and start the container, streaming its output
//! 3. Wait, with no timeout, until the container exits or a termination signal arrives
//! 4. On a signal: stop with a grace period, force-kill if unconfirmed, remove
//!
//! If waiting fails after the container was created, removal is attempted
//! before the original error is returned.

use crate::error::Result;
use crate::launch::ContainerLaunchSpec;
use crate::runtime::{ContainerHandle, ContainerRuntime, WaitStatus};
use crate::shutdown::Shutdown;
use std::time::Duration;

/// How a kernel run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The container's process exited with this code.
    Exited(i64),
    /// Dockernel was told to terminate; the container has been stopped.
    Cancelled {
        /// The signal that cancelled the run.
        signal: i32,
    },
}

impl ExitOutcome {
    /// Whether the kernel exited cleanly.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

/// Create, run and wait on the container described by `spec`.
pub fn run(
    runtime: &dyn ContainerRuntime,
    spec: &ContainerLaunchSpec,
    shutdown: &Shutdown,
    stop_timeout: Duration,
) -> Result<ExitOutcome> {
    let image = runtime.image(&spec.image)?;
    tracing::debug!(runtime = runtime.name(), image = %spec.image, id = %image.id, "found image");

    let handle = runtime.create_and_run(spec)?;
    tracing::info!(container = %handle.id, image = %spec.image, "kernel container started");

    match runtime.wait(&handle, shutdown) {
        Ok(WaitStatus::Exited(code)) => {
            tracing::info!(container = %handle.id, exit_code = code, "kernel container exited");
            Ok(ExitOutcome::Exited(code))
        }
        Ok(WaitStatus::Interrupted(signal)) => {
            tracing::info!(
                container = %handle.id,
                signal,
                "termination requested, stopping kernel container"
            );
            terminate(runtime, &handle, stop_timeout);
            Ok(ExitOutcome::Cancelled { signal })
        }
        Err(e) => {
            tracing::warn!(container = %handle.id, error = %e, "wait failed, removing container");
            if let Err(cleanup) = runtime.remove(&handle) {
                tracing::error!(
                    container = %handle.id,
                    error = %cleanup,
                    "failed to remove container after wait failure"
                );
            }
            Err(e)
        }
    }
}

/// Stop within `grace`, kill if the stop is not confirmed, then remove.
fn terminate(runtime: &dyn ContainerRuntime, handle: &ContainerHandle, grace: Duration) {
    let stopped = match runtime.stop(handle, grace) {
        Ok(stopped) => stopped,
        Err(e) => {
            tracing::warn!(container = %handle.id, error = %e, "stop request failed");
            false
        }
    };

    if !stopped {
        tracing::warn!(
            container = %handle.id,
            grace_secs = grace.as_secs(),
            "container did not stop within grace period, killing"
        );
        if let Err(e) = runtime.kill(handle) {
            tracing::error!(container = %handle.id, error = %e, "failed to kill container");
        }
    }

    if let Err(e) = runtime.remove(handle) {
        tracing::error!(container = %handle.id, error = %e, "failed to remove container");
    }
}
