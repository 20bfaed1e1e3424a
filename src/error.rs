//! Error types for dockernel.
//!
//! # Error Message Style Guide
//!
//! Messages are lowercase and carry the identifier the operator needs to
//! fix the problem:
//!
//! ```text
//! "invalid option --user: must not be empty"
//! "image not found: jupyter/base-notebook"
//! "malformed connection descriptor /run/kernel-1.json: expected a json object"
//! "container launch failed: <runtime message verbatim>"
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using dockernel's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dockernel operations.
///
/// Every variant aborts the current subcommand and maps to exit status 1.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Input Validation Errors
    // ========================================================================
    /// A runtime option is malformed.
    #[error("invalid option {field}: {reason}")]
    InvalidOption {
        /// The offending option.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A volume or bind entry is malformed.
    #[error("invalid mount: {reason}")]
    InvalidMount {
        /// Why the mount was rejected.
        reason: String,
    },

    // ========================================================================
    // Connection Descriptor Errors
    // ========================================================================
    /// The connection descriptor is unreadable or not a JSON object.
    #[error("malformed connection descriptor {}: {reason}", path.display())]
    MalformedDescriptor {
        /// Path of the descriptor.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    // ========================================================================
    // Container Runtime Errors
    // ========================================================================
    /// The container engine cannot be reached.
    #[error("container runtime not available: {0}")]
    RuntimeUnavailable(String),

    /// The requested image does not exist in the runtime.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// The exact image reference requested.
        image: String,
    },

    /// The runtime rejected container creation. Carries its message verbatim.
    #[error("container launch failed: {0}")]
    LaunchFailed(String),

    /// A runtime command other than creation failed.
    #[error("command '{command}' failed: {reason}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message or reason for failure.
        reason: String,
    },

    // ========================================================================
    // Registration Errors
    // ========================================================================
    /// Something other than a kernelspec occupies the install location.
    #[error("registration conflict: {} is occupied by a non-directory file", path.display())]
    RegistrationConflict {
        /// The occupied path.
        path: PathBuf,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration operation failed.
    #[error("config operation failed: {operation}: {reason}")]
    Config {
        /// The operation that failed (e.g., "read", "parse").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// IO error wrapper.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid option error.
    pub fn invalid_option(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid mount error.
    pub fn invalid_mount(reason: impl Into<String>) -> Self {
        Self::InvalidMount {
            reason: reason.into(),
        }
    }

    /// Create a malformed descriptor error.
    pub fn malformed_descriptor(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a runtime unavailable error.
    pub fn runtime_unavailable(reason: impl Into<String>) -> Self {
        Self::RuntimeUnavailable(reason.into())
    }

    /// Create an image not found error.
    pub fn image_not_found(image: impl Into<String>) -> Self {
        Self::ImageNotFound {
            image: image.into(),
        }
    }

    /// Create a launch failed error.
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed(message.into())
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a registration conflict error.
    pub fn registration_conflict(path: impl Into<PathBuf>) -> Self {
        Self::RegistrationConflict { path: path.into() }
    }

    /// Create a config operation error.
    pub fn config(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
