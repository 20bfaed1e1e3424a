//! dockernel - container images as notebook kernels
//!
//! dockernel registers a container image as a kernel for a Jupyter-style
//! front-end, and later launches that image wired to the connection
//! descriptor the front-end hands it.
//!
//! # Architecture
//!
//! ```text
//! install:  RuntimeOptions ──► registration ──► kernel.json
//!
//! start:    RuntimeOptions ─────────────┐
//!           connection file ─► connection (ip = 0.0.0.0, *_port)
//!                                       ▼
//!                                    launch::build ──► ContainerLaunchSpec
//!                                                          │
//!                               orchestrator::run ◄────────┘
//!                                       │
//!                                  ContainerRuntime (docker CLI)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dockernel::{connection, launch, orchestrator, DockerCli, ProcessIdentity, RuntimeOptions, Shutdown};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let options = RuntimeOptions::new("jupyter/base-notebook");
//! let conn = Path::new("/run/user/1000/jupyter/kernel-1.json");
//!
//! let descriptor = connection::patch_bind_address(conn)?;
//! let ports = connection::extract_ports(&descriptor)?;
//! let spec = launch::build(&options, &ports, conn, &ProcessIdentity)?;
//!
//! let shutdown = Shutdown::install()?;
//! let outcome = orchestrator::run(&DockerCli::default(), &spec, &shutdown, Duration::from_secs(10))?;
//! println!("kernel finished: {:?}", outcome);
//! # Ok::<(), dockernel::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod kernelspec;
pub mod launch;
pub mod options;
pub mod orchestrator;
pub mod registration;
pub mod runtime;
pub mod shutdown;
pub mod util;

// Re-export main types for convenience
pub use config::Settings;
pub use connection::{ConnectionDescriptor, PortMap};
pub use error::{Error, Result};
pub use host::{HostIdentity, ProcessIdentity, StaticIdentity};
pub use kernelspec::{InterruptMode, Kernelspec};
pub use launch::{ContainerLaunchSpec, DeviceRequest, DeviceSelection, Mount, MountKind};
pub use options::{GpuRequest, GroupSpec, MountSpec, RuntimeOptions, UserSpec, WriteMode};
pub use orchestrator::ExitOutcome;
pub use runtime::{ContainerHandle, ContainerRuntime, DockerCli, ImageInfo, WaitStatus};
pub use shutdown::Shutdown;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
