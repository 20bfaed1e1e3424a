//! Shared CLI argument parsers.

use dockernel::options::{MountSpec, WriteMode};
use std::time::Duration;

/// Parse a duration string (e.g., "30s", "5m", "1h").
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Parse a mount specification (`SOURCE:TARGET[:MODE]`).
///
/// A missing mode means read-write. Empty sources or targets are accepted
/// here and rejected when the launch spec is built.
pub fn parse_mount_spec(s: &str) -> Result<MountSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [source, target] => Ok(MountSpec::new(*source, *target, WriteMode::ReadWrite)),
        [source, target, mode] => Ok(MountSpec::new(
            *source,
            *target,
            WriteMode::from_token(mode),
        )),
        _ => Err(format!(
            "invalid mount '{}': expected source:destination[:mode]",
            s
        )),
    }
}

/// Parse an environment variable specification (`NAME=VALUE`).
///
/// The value may itself contain `=`.
pub fn parse_env_spec(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!(
            "invalid environment variable '{}': expected NAME=VALUE",
            s
        )),
    }
}
