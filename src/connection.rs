//! Connection descriptor mediation.
//!
//! The front-end writes a connection descriptor (a JSON object with an `ip`
//! and a set of `*_port` fields) before launching the kernel. The kernel runs
//! in its own network namespace, so it must listen on the wildcard address
//! for the published ports to reach it. [`patch_bind_address`] rewrites the
//! descriptor's `ip` in place before the container starts; every other field
//! is carried through unchanged.

use crate::error::{Error, Result};
use crate::util::write_atomic;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Address the containerized kernel binds to.
pub const WILDCARD_BIND_ADDRESS: &str = "0.0.0.0";

/// Descriptor key holding the bind address.
pub const IP_FIELD: &str = "ip";

/// Suffix marking descriptor keys that hold a TCP port.
pub const PORT_SUFFIX: &str = "_port";

/// Port fields of a descriptor, keyed by field name.
///
/// Values are kept as read; range checks happen when the launch spec is built.
pub type PortMap = BTreeMap<String, i64>;

/// A parsed connection descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl ConnectionDescriptor {
    /// Parse a descriptor read from `path`.
    pub fn parse(path: impl Into<PathBuf>, contents: &[u8]) -> Result<Self> {
        let path = path.into();
        let value: Value = serde_json::from_slice(contents)
            .map_err(|e| Error::malformed_descriptor(&path, format!("invalid json: {}", e)))?;

        match value {
            Value::Object(fields) => Ok(Self { path, fields }),
            other => Err(Error::malformed_descriptor(
                &path,
                format!("expected a json object, got {}", json_kind(&other)),
            )),
        }
    }

    /// Read and parse the descriptor at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path)
            .map_err(|e| Error::malformed_descriptor(path, format!("unreadable: {}", e)))?;
        Self::parse(path, &contents)
    }

    /// Path the descriptor was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The bind address, if present and a string.
    pub fn ip(&self) -> Option<&str> {
        self.fields.get(IP_FIELD).and_then(Value::as_str)
    }

    /// Set the bind address.
    pub fn set_ip(&mut self, ip: &str) {
        self.fields
            .insert(IP_FIELD.to_string(), Value::String(ip.to_string()));
    }

    /// Look up any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize the descriptor, preserving field order.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.fields).map_err(|e| {
            Error::malformed_descriptor(&self.path, format!("cannot serialize: {}", e))
        })
    }

    /// Write the descriptor back to its path atomically.
    ///
    /// Nothing is written if serialization fails.
    pub fn save(&self) -> Result<()> {
        let contents = self.to_json()?;
        write_atomic(&self.path, &contents)?;
        Ok(())
    }
}

/// Rewrite the descriptor at `path` so the kernel binds the wildcard address.
///
/// Reads the file, sets `ip` to [`WILDCARD_BIND_ADDRESS`], replaces the file
/// atomically and returns the patched descriptor. The original file content
/// does not survive.
pub fn patch_bind_address(path: &Path) -> Result<ConnectionDescriptor> {
    let mut descriptor = ConnectionDescriptor::load(path)?;
    let previous = descriptor.ip().map(str::to_string);

    descriptor.set_ip(WILDCARD_BIND_ADDRESS);
    descriptor.save()?;

    tracing::debug!(
        path = %path.display(),
        previous_ip = ?previous,
        ip = WILDCARD_BIND_ADDRESS,
        "patched connection descriptor bind address"
    );
    Ok(descriptor)
}

/// Collect every `*_port` field of the descriptor.
///
/// Fails with [`Error::MalformedDescriptor`] if a port field is not an integer.
pub fn extract_ports(descriptor: &ConnectionDescriptor) -> Result<PortMap> {
    descriptor
        .fields
        .iter()
        .filter(|(key, _)| key.ends_with(PORT_SUFFIX))
        .map(|(key, value)| {
            value.as_i64().map(|port| (key.clone(), port)).ok_or_else(|| {
                Error::malformed_descriptor(
                    descriptor.path(),
                    format!("{} must be an integer, got {}", key, value),
                )
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
