//! Container launch specification builder.
//!
//! [`build`] translates [`RuntimeOptions`] plus the descriptor's port fields
//! into a runtime-agnostic [`ContainerLaunchSpec`]. Translation is pure: the
//! only host state it consults comes through the [`HostIdentity`] argument.
//!
//! Optional collections (`mounts`, `ports`, `group_add`, `device_requests`)
//! are `None` rather than empty when there is nothing to pass. Some runtime
//! bindings attach default behavior to an explicit empty list, and port maps
//! in particular behave differently under non-bridge network modes.

use crate::connection::PortMap;
use crate::error::{Error, Result};
use crate::host::HostIdentity;
use crate::options::{GpuRequest, GroupSpec, MountSpec, RuntimeOptions, UserSpec};
use std::collections::BTreeMap;
use std::path::Path;

/// Variable exposing the connection descriptor path to the kernel process.
pub const CONNECTION_FILE_ENV: &str = "DOCKERNEL_CONNECTION_FILE";

/// Device capability class requested for accelerators.
pub const GPU_CAPABILITY: &str = "gpu";

/// Kind of a container mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Named volume managed by the runtime.
    Volume,
    /// Host path bind mount.
    Bind,
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountKind::Volume => write!(f, "volume"),
            MountKind::Bind => write!(f, "bind"),
        }
    }
}

/// A resolved container mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Volume name or host path.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Volume or bind.
    pub kind: MountKind,
    /// Read-only mount.
    pub read_only: bool,
}

/// Which devices of a capability class to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Every available device.
    All,
    /// Exactly these device ids.
    Ids(Vec<String>),
}

/// Request for accelerator devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Devices to attach.
    pub selection: DeviceSelection,
    /// Capability classes the devices must provide.
    pub capabilities: Vec<String>,
}

/// Fully resolved description of how to create and run a kernel container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLaunchSpec {
    /// Image reference.
    pub image: String,
    /// Environment, last write wins, first-seen order.
    pub env: Vec<(String, String)>,
    /// Mounts, absent when there are none.
    pub mounts: Option<Vec<Mount>>,
    /// Published ports (container port -> host port), absent unless network is `bind`.
    pub ports: Option<BTreeMap<u16, u16>>,
    /// Network mode, verbatim from the options.
    pub network_mode: String,
    /// Run-as identity.
    pub user: Option<String>,
    /// Supplementary groups.
    pub group_add: Option<Vec<String>>,
    /// Accelerator requests.
    pub device_requests: Option<Vec<DeviceRequest>>,
    /// Runtime removes the container when it exits.
    pub auto_remove: bool,
    /// Stream the container's stdout.
    pub capture_stdout: bool,
    /// Stream the container's stderr.
    pub capture_stderr: bool,
}

impl ContainerLaunchSpec {
    /// Value of an environment variable.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Translate options and descriptor ports into a launch spec.
///
/// # Errors
///
/// - [`Error::InvalidOption`] for an empty image, an empty user or group,
///   or a published port outside 1-65535
/// - [`Error::InvalidMount`] for a volume or bind with an empty source or target
pub fn build(
    options: &RuntimeOptions,
    ports: &PortMap,
    connection_file: &Path,
    host: &dyn HostIdentity,
) -> Result<ContainerLaunchSpec> {
    if options.image_name.trim().is_empty() {
        return Err(Error::invalid_option("image", "must not be empty"));
    }

    let mut env = vec![(
        CONNECTION_FILE_ENV.to_string(),
        connection_file.display().to_string(),
    )];
    for (name, value) in &options.env {
        set_env(&mut env, name, value);
    }

    let mut mounts = Vec::with_capacity(options.volumes.len() + options.binds.len());
    for spec in &options.volumes {
        mounts.push(to_mount(spec, MountKind::Volume)?);
    }
    for spec in &options.binds {
        mounts.push(to_mount(spec, MountKind::Bind)?);
    }

    let ports = if options.publishes_ports() {
        Some(publish_ports(ports)?)
    } else {
        None
    };

    let user = options
        .user
        .as_ref()
        .map(|user| resolve_user(user, host))
        .transpose()?;

    let group_add = options
        .group_add
        .as_ref()
        .map(|groups| resolve_groups(groups, host))
        .transpose()?;

    let device_requests = options.gpus.as_ref().map(|gpu| vec![device_request(gpu)]);

    Ok(ContainerLaunchSpec {
        image: options.image_name.clone(),
        env,
        mounts: (!mounts.is_empty()).then_some(mounts),
        ports,
        network_mode: options.network.clone(),
        user,
        group_add,
        device_requests,
        auto_remove: true,
        capture_stdout: true,
        capture_stderr: true,
    })
}

fn set_env(env: &mut Vec<(String, String)>, name: &str, value: &str) {
    match env.iter_mut().find(|(key, _)| key == name) {
        Some(entry) => entry.1 = value.to_string(),
        None => env.push((name.to_string(), value.to_string())),
    }
}

fn to_mount(spec: &MountSpec, kind: MountKind) -> Result<Mount> {
    if spec.source.is_empty() {
        return Err(Error::invalid_mount(format!(
            "{} '{}' has an empty source",
            kind, spec
        )));
    }
    if spec.target.is_empty() {
        return Err(Error::invalid_mount(format!(
            "{} '{}' has an empty target",
            kind, spec
        )));
    }

    Ok(Mount {
        source: spec.source.clone(),
        target: spec.target.clone(),
        kind,
        read_only: spec.mode.is_read_only(),
    })
}

fn publish_ports(ports: &PortMap) -> Result<BTreeMap<u16, u16>> {
    ports
        .iter()
        .map(|(name, &port)| match u16::try_from(port) {
            Ok(p) if p != 0 => Ok((p, p)),
            _ => Err(Error::invalid_option(
                name,
                format!("port {} is outside 1-65535", port),
            )),
        })
        .collect()
}

fn resolve_user(user: &UserSpec, host: &dyn HostIdentity) -> Result<String> {
    match user {
        UserSpec::CurrentUser => Ok(host.uid()?.to_string()),
        UserSpec::Literal(name) if name.is_empty() => {
            Err(Error::invalid_option("user", "must not be empty"))
        }
        UserSpec::Literal(name) => Ok(name.clone()),
    }
}

fn resolve_groups(groups: &GroupSpec, host: &dyn HostIdentity) -> Result<Vec<String>> {
    match groups {
        GroupSpec::CurrentGroups => Ok(host.groups()?.iter().map(u32::to_string).collect()),
        GroupSpec::Literal(names) => {
            if names.is_empty() || names.iter().any(String::is_empty) {
                return Err(Error::invalid_option(
                    "group-add",
                    format!("empty group in '{}'", groups),
                ));
            }
            Ok(names.clone())
        }
    }
}

fn device_request(gpu: &GpuRequest) -> DeviceRequest {
    let selection = match gpu {
        GpuRequest::All => DeviceSelection::All,
        GpuRequest::Device(id) => DeviceSelection::Ids(vec![id.clone()]),
    };
    DeviceRequest {
        selection,
        capabilities: vec![GPU_CAPABILITY.to_string()],
    }
}
