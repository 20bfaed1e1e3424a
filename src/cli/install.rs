//! `dockernel install`: register an image as a kernel.

use crate::cli::RuntimeArgs;
use clap::Args;
use dockernel::runtime::{ContainerRuntime, DockerCli};
use dockernel::{registration, Settings};
use std::path::PathBuf;

/// Install a container image into Jupyter as a kernel.
///
/// Examples:
///   dockernel install jupyter/base-notebook
///   dockernel install --name "Python (GPU)" -l python --gpus all -u -1 my/kernel
#[derive(Args, Debug)]
pub struct InstallCmd {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Display name for the kernelspec (default: the image name)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Language of the kernel; empty matches on display name only
    #[arg(short = 'l', long, value_name = "LANG", default_value = "")]
    pub language: String,

    /// Install into this kernelspec directory instead of the user default
    #[arg(long, value_name = "DIR")]
    pub kernels_dir: Option<PathBuf>,
}

impl InstallCmd {
    pub fn run(self, settings: &Settings) -> dockernel::Result<()> {
        let options = self.runtime.into_options();

        let spec = registration::register(
            &options,
            self.name.as_deref(),
            &self.language,
            &registration::program_path(),
        )?;

        let runtime = DockerCli::new(&settings.docker);
        let image = runtime.image(&options.image_name)?;
        let kernel_id = registration::kernel_id(&options.image_name, Some(&image));

        let store = settings.kernels_dir(self.kernels_dir.as_deref())?;
        std::fs::create_dir_all(&store)?;
        let path = registration::install(&store, &kernel_id, &spec)?;

        println!("Installed kernel: {}", spec.display_name);
        println!("  Kernelspec: {}", path.display());

        Ok(())
    }
}
