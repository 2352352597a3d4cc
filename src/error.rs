//! Error taxonomy shared by every remote operation.
//!
//! Configuration and authentication problems are kept apart from transport
//! failures so callers can choose between asking for new credentials and
//! retrying the operation.

use std::time::Duration;

use thiserror::Error;

/// Output fragment the remote shell prints when a path does not exist.
pub const NOT_FOUND_MARKER: &str = "No such file or directory";

/// Errors surfaced while validating configuration or talking to the remote.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when remote configuration or per-call parameters are missing,
    /// unrecognised, or ambiguous.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Human readable description of the problem.
        message: String,
    },
    /// Raised when the remote reports that the requested path is absent.
    #[error("{command}: remote path not found: {output}")]
    NotFound {
        /// Command that reported the missing path.
        command: String,
        /// Output captured from the command.
        output: String,
    },
    /// Raised when a remote command exits unsuccessfully for any other reason.
    #[error("{command} exited with status {status_text}: {output}")]
    RemoteCommandFailed {
        /// Command that failed.
        command: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Output captured from the command.
        output: String,
    },
    /// Raised when the remote write pipeline does not finish in time.
    #[error("timed out waiting for {command} after {timeout:?}")]
    Timeout {
        /// Command that did not complete.
        command: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the temporary credential file cannot be prepared.
    #[error("failed to prepare credential file: {message}")]
    Credential {
        /// Operating system error string.
        message: String,
    },
    /// Raised when commit metadata cannot be decoded.
    #[error("failed to parse {resource}: {message}")]
    Parse {
        /// Resource being parsed (for example a metadata path).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when commit metadata cannot be encoded.
    #[error("failed to serialise commit {commit_id}: {message}")]
    Serialize {
        /// Commit whose metadata could not be encoded.
        commit_id: String,
        /// Encoder error message.
        message: String,
    },
}

impl RemoteError {
    /// Builds an [`RemoteError::InvalidConfiguration`] from any message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that retrying cannot fix: bad configuration
    /// or unresolvable credentials.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }

    /// Returns `true` when the remote reported a missing path.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
