//! Kernel registration.
//!
//! Builds the kernelspec whose `argv` re-invokes `dockernel start` with the
//! same runtime options, and installs it into the kernelspec registry.

use crate::error::{Error, Result};
use crate::kernelspec::{
    install_kernelspec, kernel_dir, kernel_id_from_image, random_kernel_id, InterruptMode,
    Kernelspec, CONNECTION_FILE_PLACEHOLDER,
};
use crate::options::RuntimeOptions;
use crate::runtime::ImageInfo;
use std::path::{Path, PathBuf};

/// Subcommand the registered argv invokes.
pub const START_SUBCOMMAND: &str = "start";

/// Program name used when the running executable can't be located.
pub const DEFAULT_PROGRAM: &str = "dockernel";

/// Path of the running dockernel executable, for `argv[0]`.
pub fn program_path() -> String {
    match std::env::current_exe() {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "cannot locate dockernel executable, using PATH lookup");
            DEFAULT_PROGRAM.to_string()
        }
    }
}

/// Re-serialize `options` into a `start` command line.
///
/// Every option the launch builder consumes is emitted, followed by the image
/// and the connection-file placeholder.
pub fn launch_argv(program: &str, options: &RuntimeOptions) -> Vec<String> {
    let mut argv = vec![program.to_string(), START_SUBCOMMAND.to_string()];

    for (name, value) in &options.env {
        argv.push("--env".to_string());
        argv.push(format!("{}={}", name, value));
    }
    for volume in &options.volumes {
        argv.push("--volume".to_string());
        argv.push(volume.to_string());
    }
    for bind in &options.binds {
        argv.push("--bind".to_string());
        argv.push(bind.to_string());
    }
    if let Some(gpus) = &options.gpus {
        argv.push("--gpus".to_string());
        argv.push(gpus.to_string());
    }
    if let Some(user) = &options.user {
        argv.push("--user".to_string());
        argv.push(user.to_string());
    }
    if let Some(groups) = &options.group_add {
        argv.push("--group-add".to_string());
        argv.push(groups.to_string());
    }
    argv.push("--network".to_string());
    argv.push(options.network.clone());

    argv.push(options.image_name.clone());
    argv.push(CONNECTION_FILE_PLACEHOLDER.to_string());
    argv
}

/// Build the kernelspec for `options`.
///
/// `display_name` defaults to the image name. Interrupts are always delivered
/// as messages: host signals cannot reach a process inside the container.
pub fn register(
    options: &RuntimeOptions,
    display_name: Option<&str>,
    language: &str,
    program: &str,
) -> Result<Kernelspec> {
    if options.image_name.trim().is_empty() {
        return Err(Error::invalid_option("image", "must not be empty"));
    }

    Ok(Kernelspec {
        argv: launch_argv(program, options),
        display_name: display_name
            .map(str::to_string)
            .unwrap_or_else(|| options.image_name.clone()),
        language: language.to_string(),
        interrupt_mode: InterruptMode::Message,
    })
}

/// Stable identifier for the image's kernelspec directory.
///
/// Derived from the image reference, then from the image's content id; if
/// neither yields anything usable a random identifier is generated.
pub fn kernel_id(image_name: &str, info: Option<&ImageInfo>) -> String {
    kernel_id_from_image(image_name)
        .or_else(|| info.and_then(|i| kernel_id_from_image(i.short_id())))
        .unwrap_or_else(random_kernel_id)
}

/// Install `spec` for `kernel_id` under `store`. Returns the written document path.
pub fn install(store: &Path, kernel_id: &str, spec: &Kernelspec) -> Result<PathBuf> {
    let location = kernel_dir(store, kernel_id);
    let path = install_kernelspec(&location, spec)?;
    tracing::info!(
        kernel = %kernel_id,
        display_name = %spec.display_name,
        path = %path.display(),
        "installed kernelspec"
    );
    Ok(path)
}
