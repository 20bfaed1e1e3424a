//! Runtime option model.
//!
//! [`RuntimeOptions`] is the immutable record built once from validated CLI
//! input and threaded by reference through the spec builder, the
//! registration service and the orchestrator.

use std::fmt;
use std::str::FromStr;

/// Network mode that publishes every kernel port on the identical host port.
pub const BIND_NETWORK: &str = "bind";

/// Option value asking for identity to be resolved from the invoking host user.
pub const RESOLVE_FROM_HOST: &str = "-1";

/// Write mode of a volume or bind entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Mounted read-only (`ro`).
    ReadOnly,
    /// Mounted read-write (`rw`, the default).
    #[default]
    ReadWrite,
}

impl WriteMode {
    /// Map a mode token to a write mode. Only `ro` is read-only.
    pub fn from_token(token: &str) -> Self {
        match token {
            "ro" => WriteMode::ReadOnly,
            "rw" => WriteMode::ReadWrite,
            other => {
                tracing::warn!(mode = %other, "unknown mount mode, mounting read-write");
                WriteMode::ReadWrite
            }
        }
    }

    /// Whether the mount is read-only.
    pub fn is_read_only(self) -> bool {
        self == WriteMode::ReadOnly
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::ReadOnly => write!(f, "ro"),
            WriteMode::ReadWrite => write!(f, "rw"),
        }
    }
}

/// A volume or bind entry: `source:target[:mode]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Volume name or host path.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Resolved write mode.
    pub mode: WriteMode,
}

impl MountSpec {
    /// Create a mount entry.
    pub fn new(source: impl Into<String>, target: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mode,
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.target, self.mode)
    }
}

/// Accelerator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuRequest {
    /// Every available GPU.
    All,
    /// Exactly the named device.
    Device(String),
}

impl FromStr for GpuRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" => Err("gpu request must not be empty".to_string()),
            "all" => Ok(GpuRequest::All),
            id => Ok(GpuRequest::Device(id.to_string())),
        }
    }
}

impl fmt::Display for GpuRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuRequest::All => write!(f, "all"),
            GpuRequest::Device(id) => write!(f, "{}", id),
        }
    }
}

/// Identity the container process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSpec {
    /// The numeric id of the invoking host user, resolved at launch.
    CurrentUser,
    /// A literal user name or id, passed through unchanged.
    Literal(String),
}

impl UserSpec {
    /// Interpret a `--user` value.
    pub fn from_arg(value: &str) -> Self {
        if value == RESOLVE_FROM_HOST {
            UserSpec::CurrentUser
        } else {
            UserSpec::Literal(value.to_string())
        }
    }
}

impl fmt::Display for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserSpec::CurrentUser => write!(f, "{}", RESOLVE_FROM_HOST),
            UserSpec::Literal(user) => write!(f, "{}", user),
        }
    }
}

/// Supplementary groups the container process joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// Every group id of the invoking host user, resolved at launch.
    CurrentGroups,
    /// Literal group names or ids.
    Literal(Vec<String>),
}

impl GroupSpec {
    /// Interpret a `--group-add` value. Comma-separated values name several groups.
    pub fn from_arg(value: &str) -> Self {
        if value == RESOLVE_FROM_HOST {
            GroupSpec::CurrentGroups
        } else {
            GroupSpec::Literal(value.split(',').map(|g| g.trim().to_string()).collect())
        }
    }
}

impl fmt::Display for GroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupSpec::CurrentGroups => write!(f, "{}", RESOLVE_FROM_HOST),
            GroupSpec::Literal(groups) => write!(f, "{}", groups.join(",")),
        }
    }
}

/// Launch options for a kernel container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Image reference to run.
    pub image_name: String,
    /// Named-volume mounts, in input order.
    pub volumes: Vec<MountSpec>,
    /// Bind mounts, in input order.
    pub binds: Vec<MountSpec>,
    /// Accelerator request, if any.
    pub gpus: Option<GpuRequest>,
    /// Run-as identity, if any.
    pub user: Option<UserSpec>,
    /// Supplementary groups, if any.
    pub group_add: Option<GroupSpec>,
    /// Network mode; [`BIND_NETWORK`] publishes kernel ports.
    pub network: String,
    /// Environment entries, in input order. Duplicate names are allowed.
    pub env: Vec<(String, String)>,
}

impl RuntimeOptions {
    /// Options for `image_name` with every other field at its default.
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            volumes: Vec::new(),
            binds: Vec::new(),
            gpus: None,
            user: None,
            group_add: None,
            network: BIND_NETWORK.to_string(),
            env: Vec::new(),
        }
    }

    /// Whether kernel ports are published on identical host ports.
    pub fn publishes_ports(&self) -> bool {
        self.network == BIND_NETWORK
    }
}
