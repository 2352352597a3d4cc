//! Stored remote settings layered with `ortho-config`.
//!
//! Settings merge defaults, a discovered `ssh-remote.toml`, and `SSH_REMOTE_*`
//! environment variables. The remote fields are handed to the same validator
//! the host application uses, so a stored remote obeys the same rules as one
//! passed in as a raw mapping.

use std::fmt;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::config::{RawMap, RemoteConfig, validate_remote};
use crate::error::RemoteError;
use crate::ssh::{DEFAULT_RSYNC_BIN, DEFAULT_SSH_BIN, DEFAULT_SSHPASS_BIN, ToolPaths};

/// Remote and tool settings loaded via `ortho-config`.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SSH_REMOTE",
    discovery(
        app_name = "ssh-remote",
        env_var = "SSH_REMOTE_CONFIG_PATH",
        config_file_name = "ssh-remote.toml",
        dotfile_name = ".ssh-remote.toml",
        project_file_name = "ssh-remote.toml"
    )
)]
pub struct RemoteSettings {
    /// Remote user to connect as.
    pub username: Option<String>,
    /// Host name or address of the remote.
    pub address: Option<String>,
    /// Base directory holding the commits.
    pub path: Option<String>,
    /// Stored password.
    pub password: Option<String>,
    /// SSH port override. Kept as a raw number so the validator applies the
    /// same coercion and range rules as for a raw mapping.
    pub port: Option<Number>,
    /// Local private key used when no password is configured.
    pub key_file: Option<String>,
    /// Path to the `ssh` executable.
    #[ortho_config(default = DEFAULT_SSH_BIN.to_owned())]
    pub ssh_bin: String,
    /// Path to the `sshpass` executable.
    #[ortho_config(default = DEFAULT_SSHPASS_BIN.to_owned())]
    pub sshpass_bin: String,
    /// Path to the `rsync` executable.
    #[ortho_config(default = DEFAULT_RSYNC_BIN.to_owned())]
    pub rsync_bin: String,
    /// Whether volume directories are created with `sudo`.
    #[ortho_config(default = true)]
    pub elevate_mkdir: bool,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("key_file", &self.key_file)
            .field("ssh_bin", &self.ssh_bin)
            .field("sshpass_bin", &self.sshpass_bin)
            .field("rsync_bin", &self.rsync_bin)
            .field("elevate_mkdir", &self.elevate_mkdir)
            .finish()
    }
}

/// Errors raised when loading settings from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SettingsLoadError {
    /// Parsing or merging configuration layers failed.
    #[error("settings parsing failed: {0}")]
    Parse(String),
    /// The merged settings do not describe a valid remote.
    #[error("{source}; set SSH_REMOTE_USERNAME, SSH_REMOTE_ADDRESS and SSH_REMOTE_PATH or add them to ssh-remote.toml")]
    Invalid {
        /// Validation failure.
        #[source]
        source: RemoteError,
    },
}

impl RemoteSettings {
    /// Loads settings from defaults, configuration files, and environment
    /// variables, ignoring the process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SettingsLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("ssh-remote")])
            .map_err(|err| SettingsLoadError::Parse(err.to_string()))
    }

    /// Renders the remote fields as a raw mapping, omitting unset values.
    #[must_use]
    pub fn to_raw(&self) -> RawMap {
        let mut raw = RawMap::new();
        let strings = [
            ("username", &self.username),
            ("address", &self.address),
            ("path", &self.path),
            ("password", &self.password),
            ("keyFile", &self.key_file),
        ];
        for (key, value) in strings {
            if let Some(text) = value {
                raw.insert(key.to_owned(), Value::from(text.clone()));
            }
        }
        if let Some(port) = &self.port {
            raw.insert(String::from("port"), Value::Number(port.clone()));
        }
        raw
    }

    /// Validates the stored remote.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsLoadError::Invalid`] when a required field is
    /// missing or the port is out of range.
    pub fn remote(&self) -> Result<RemoteConfig, SettingsLoadError> {
        validate_remote(&self.to_raw()).map_err(|source| SettingsLoadError::Invalid { source })
    }

    /// Executables configured for SSH, `sshpass`, and rsync.
    #[must_use]
    pub fn tools(&self) -> ToolPaths {
        ToolPaths {
            ssh_bin: self.ssh_bin.clone(),
            sshpass_bin: self.sshpass_bin.clone(),
            rsync_bin: self.rsync_bin.clone(),
        }
    }
}
