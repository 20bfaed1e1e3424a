//! CLI command implementations.

pub mod install;
pub mod parsers;
pub mod start;

use clap::Args;
use dockernel::options::{GpuRequest, GroupSpec, MountSpec, RuntimeOptions, UserSpec, BIND_NETWORK};
use parsers::{parse_env_spec, parse_mount_spec};

/// Container options shared by `install` and `start`.
///
/// `install` records these in the kernelspec argv; `start` turns them into
/// the container launch.
#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Name of the container image to use
    #[arg(value_name = "IMAGE")]
    pub image_name: String,

    /// Mount a named volume (can be used multiple times)
    #[arg(short = 'v', long = "volume", value_name = "SOURCE:DEST[:ro|rw]", value_parser = parse_mount_spec)]
    pub volume: Vec<MountSpec>,

    /// Bind-mount a host path (can be used multiple times)
    #[arg(short = 'b', long = "bind", value_name = "SOURCE:DEST[:ro|rw]", value_parser = parse_mount_spec)]
    pub bind: Vec<MountSpec>,

    /// GPU devices to attach: "all" or a device id
    #[arg(long, value_name = "all|ID")]
    pub gpus: Option<GpuRequest>,

    /// User to run the container as; -1 means the current host user
    #[arg(short = 'u', long, value_name = "USER", allow_hyphen_values = true)]
    pub user: Option<String>,

    /// Groups to join; -1 means every group of the current host user
    #[arg(long = "group-add", value_name = "GROUP[,GROUP...]", allow_hyphen_values = true)]
    pub group_add: Option<String>,

    /// Set an environment variable (can be used multiple times)
    #[arg(short = 'e', long = "env", value_name = "NAME=VALUE", value_parser = parse_env_spec)]
    pub env: Vec<(String, String)>,

    /// Network mode; "bind" publishes kernel ports on the same host ports
    #[arg(long, value_name = "MODE", default_value = BIND_NETWORK)]
    pub network: String,
}

impl RuntimeArgs {
    /// Convert to the immutable option record.
    pub fn into_options(self) -> RuntimeOptions {
        RuntimeOptions {
            image_name: self.image_name,
            volumes: self.volume,
            binds: self.bind,
            gpus: self.gpus,
            user: self.user.as_deref().map(UserSpec::from_arg),
            group_add: self.group_add.as_deref().map(GroupSpec::from_arg),
            network: self.network,
            env: self.env,
        }
    }
}
