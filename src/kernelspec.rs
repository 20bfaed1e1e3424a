//! Kernelspec documents and the user kernelspec registry.
//!
//! A kernelspec is the `kernel.json` a notebook front-end reads to learn how
//! to launch a kernel:
//!
//! ```json
//! {
//!   "argv": ["/usr/local/bin/dockernel", "start", "my/image", "{connection_file}"],
//!   "display_name": "my/image",
//!   "language": "",
//!   "interrupt_mode": "message"
//! }
//! ```

use crate::error::{Error, Result};
use crate::util::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of a kernelspec document inside its directory.
pub const KERNELSPEC_FILE: &str = "kernel.json";

/// Prefix of every kernelspec directory dockernel installs.
pub const KERNEL_DIR_PREFIX: &str = "dockernel-";

/// Placeholder the front-end replaces with the real connection-file path.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Environment variable relocating the Jupyter data directory.
pub const JUPYTER_DATA_DIR_ENV: &str = "JUPYTER_DATA_DIR";

/// How the front-end interrupts a running kernel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterruptMode {
    /// Send SIGINT to the kernel process.
    Signal,
    /// Send an `interrupt_request` message on the control channel.
    Message,
}

/// A kernelspec document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Kernelspec {
    /// Launch command; the last element is [`CONNECTION_FILE_PLACEHOLDER`].
    pub argv: Vec<String>,
    /// Name shown in the front-end.
    pub display_name: String,
    /// Kernel language. Empty means "match on display name only".
    pub language: String,
    /// Interrupt delivery mode.
    pub interrupt_mode: InterruptMode,
}

impl Kernelspec {
    /// Serialize to the on-disk JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config("serialize kernelspec", e.to_string()))
    }
}

/// Default user kernelspec registry for this platform.
///
/// Honors `$JUPYTER_DATA_DIR`; otherwise uses the directory Jupyter itself
/// searches for per-user kernels.
pub fn default_kernels_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(JUPYTER_DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("kernels"));
    }
    platform_data_dir().map(|d| d.join("kernels"))
}

#[cfg(target_os = "macos")]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join("Library").join("Jupyter"))
}

#[cfg(target_os = "windows")]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("jupyter"))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("jupyter"))
}

/// Derive a filesystem-safe kernel identifier from an image reference.
///
/// Lowercases the reference and replaces anything outside `[a-z0-9._-]`
/// with `-`. Returns `None` when nothing usable remains.
pub fn kernel_id_from_image(image: &str) -> Option<String> {
    let mapped: String = image
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = mapped.trim_matches(|c| c == '-' || c == '.');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Random 16-hex-character identifier.
pub fn random_kernel_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Directory holding the kernelspec for `kernel_id`.
pub fn kernel_dir(store: &Path, kernel_id: &str) -> PathBuf {
    store.join(format!("{}{}", KERNEL_DIR_PREFIX, kernel_id))
}

/// Write `spec` into `location`, creating directories as needed.
///
/// An existing kernelspec at `location` is overwritten. Fails with
/// [`Error::RegistrationConflict`] if `location` (or its `kernel.json`) is
/// occupied by something of the wrong kind.
pub fn install_kernelspec(location: &Path, spec: &Kernelspec) -> Result<PathBuf> {
    if location.exists() && !location.is_dir() {
        return Err(Error::registration_conflict(location));
    }
    std::fs::create_dir_all(location)?;

    let document = location.join(KERNELSPEC_FILE);
    if document.is_dir() {
        return Err(Error::registration_conflict(&document));
    }

    write_atomic(&document, spec.to_json()?.as_bytes())?;

    tracing::debug!(path = %document.display(), "wrote kernelspec");
    Ok(document)
}
