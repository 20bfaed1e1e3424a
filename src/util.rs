//! Filesystem helpers.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace the contents of `path` with `contents` atomically.
///
/// Writes a sibling temp file, syncs it, then renames it over `path`, so a
/// crash mid-write leaves either the old or the new file, never a truncated one.
///
/// An existing file keeps its permissions. The temp file is owner-only until
/// they are applied, so contents are never readable more widely than before.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_sibling(path);
    let existing = fs::metadata(path).ok().map(|m| m.permissions());

    let result = (|| {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if existing.is_some() {
                options.mode(0o600);
            }
        }

        let mut file = options.open(&temp_path)?;
        if let Some(permissions) = &existing {
            file.set_permissions(permissions.clone())?;
        }
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}
