//! Error types for the bootstrap delegate.

use thiserror::Error;

/// Errors surfaced while rendering or running a bootstrap.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BootstrapError {
    /// Raised when bootstrap settings are missing required values.
    #[error("missing {field}: set EUCA_BOOTSTRAP_{env_suffix} or add {field} to [bootstrap] in knife-euca.toml", env_suffix = field.to_uppercase())]
    InvalidSettings {
        /// Settings field that failed validation.
        field: String,
    },
    /// Raised when the settings loader cannot merge its sources.
    #[error("bootstrap configuration parsing failed: {0}")]
    Load(String),
    /// Raised when no built-in template matches the requested distro.
    #[error("unknown bootstrap distro '{distro}' (available: {available})")]
    UnknownDistro {
        /// Distro requested by the caller.
        distro: String,
        /// Comma separated list of built-in distros.
        available: String,
    },
    /// Raised when a template or key file cannot be read.
    #[error("failed to read {path}: {message}")]
    Read {
        /// Path that could not be read.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the bootstrap template fails to render.
    #[error("failed to render bootstrap template {template}: {message}")]
    Render {
        /// Template name or path.
        template: String,
        /// Renderer error message.
        message: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the SSH client reports that the port refused the
    /// connection.
    #[error("connection refused by {host}")]
    ConnectionRefused {
        /// Host that refused the connection.
        host: String,
    },
    /// Raised when the bootstrap command exits unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

impl BootstrapError {
    /// Returns `true` when the bootstrap failed because the SSH port refused
    /// the connection, which clears once sshd finishes starting.
    #[must_use]
    pub const fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}
