//! dockernel CLI entry point.

use clap::{Parser, Subcommand};
use dockernel::{shutdown, ExitOutcome, Settings};
use tracing_subscriber::EnvFilter;

mod cli;

/// dockernel - container images as notebook kernels
#[derive(Parser, Debug)]
#[command(name = "dockernel")]
#[command(about = "Adds container images to Jupyter as kernels")]
#[command(
    long_about = "dockernel registers a container image as a Jupyter kernel and launches it \
when the front-end starts that kernel.\n\n\
Quick start:\n  \
dockernel install jupyter/base-notebook\n  \
dockernel install --gpus all -u -1 -b $HOME:/home/jovyan/work my/kernel"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a container image into Jupyter as a kernel
    Install(cli::install::InstallCmd),

    /// Start a kernel container (invoked by the front-end)
    Start(cli::start::StartCmd),
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version requests are not failures
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    tracing::debug!(version = dockernel::VERSION, "starting dockernel");

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> dockernel::Result<i32> {
    let settings = Settings::load()?;

    match cli.command {
        Commands::Install(cmd) => {
            cmd.run(&settings)?;
            Ok(0)
        }
        Commands::Start(cmd) => match cmd.run(&settings)? {
            ExitOutcome::Exited(0) => Ok(0),
            ExitOutcome::Exited(code) => {
                tracing::warn!(exit_code = code, "kernel exited with an error");
                Ok(1)
            }
            ExitOutcome::Cancelled { signal } => shutdown::reraise(signal),
        },
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dockernel=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
