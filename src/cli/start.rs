//! `dockernel start`: launch a kernel container for a front-end.

use crate::cli::parsers::parse_duration;
use crate::cli::RuntimeArgs;
use clap::Args;
use dockernel::runtime::DockerCli;
use dockernel::{connection, launch, orchestrator, Error, ExitOutcome, ProcessIdentity, Settings, Shutdown};
use std::path::PathBuf;
use std::time::Duration;

/// Start a kernel container.
///
/// Normally invoked by the front-end through an installed kernelspec, which
/// substitutes the real connection file path.
#[derive(Args, Debug)]
pub struct StartCmd {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Connection file written by the front-end
    #[arg(value_name = "CONNECTION_FILE")]
    pub connection_file: PathBuf,

    /// Time to wait for the container to stop before force kill (default: 10s)
    #[arg(short = 't', long, value_parser = parse_duration, value_name = "DURATION")]
    pub stop_timeout: Option<Duration>,
}

impl StartCmd {
    pub fn run(self, settings: &Settings) -> dockernel::Result<ExitOutcome> {
        let options = self.runtime.into_options();

        let connection_file = self.connection_file.canonicalize().map_err(|e| {
            Error::malformed_descriptor(&self.connection_file, format!("unreadable: {}", e))
        })?;
        tracing::info!(path = %connection_file.display(), "using connection file");

        // Signals from here on stop the container instead of orphaning it
        let shutdown = Shutdown::install()?;

        let descriptor = connection::patch_bind_address(&connection_file)?;
        let ports = connection::extract_ports(&descriptor)?;
        let spec = launch::build(&options, &ports, &connection_file, &ProcessIdentity)?;
        tracing::debug!(spec = ?spec, "built container launch spec");

        let runtime = DockerCli::new(&settings.docker);
        let stop_timeout = self.stop_timeout.unwrap_or(settings.stop_timeout);
        orchestrator::run(&runtime, &spec, &shutdown, stop_timeout)
    }
}
