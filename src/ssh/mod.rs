//! SSH command construction and scoped credential files.
//!
//! Secrets never appear on a command line. The resolved password or key is
//! written to a uniquely named temporary file readable only by its owner,
//! and the file is removed when the [`CredentialFile`] guard is dropped.

use std::fs::File;
use std::io::{self, Seek, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::auth::ResolvedAuth;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Default name of the SSH client executable.
pub const DEFAULT_SSH_BIN: &str = "ssh";
/// Default name of the `sshpass` executable.
pub const DEFAULT_SSHPASS_BIN: &str = "sshpass";
/// Default name of the `rsync` executable.
pub const DEFAULT_RSYNC_BIN: &str = "rsync";

const CREDENTIAL_PREFIX: &str = "ssh-remote-cred-";

/// Host key verification is off for managed, ephemeral remotes.
const HOST_KEY_OPTIONS: [&str; 4] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
];

/// Executables used to reach the remote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolPaths {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Path to the `sshpass` executable.
    pub sshpass_bin: String,
    /// Path to the `rsync` executable.
    pub rsync_bin: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ssh_bin: DEFAULT_SSH_BIN.to_owned(),
            sshpass_bin: DEFAULT_SSHPASS_BIN.to_owned(),
            rsync_bin: DEFAULT_RSYNC_BIN.to_owned(),
        }
    }
}

/// Owner-only temporary file holding one secret for one invocation.
///
/// The file is deleted when the guard goes out of scope, whichever way the
/// surrounding call exits.
#[derive(Debug)]
pub struct CredentialFile {
    file: NamedTempFile,
    path: Utf8PathBuf,
}

impl CredentialFile {
    /// Creates an empty, uniquely named credential file.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Credential`] when the file cannot be created or
    /// its path is not valid UTF-8.
    pub fn create() -> Result<Self, RemoteError> {
        let file = tempfile::Builder::new()
            .prefix(CREDENTIAL_PREFIX)
            .tempfile()
            .map_err(credential_error)?;
        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).map_err(|path| {
            RemoteError::Credential {
                message: format!("temporary path is not valid UTF-8: {}", path.display()),
            }
        })?;
        Ok(Self { file, path })
    }

    /// Location of the credential on disk.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Replaces the file contents with `secret` and makes it owner read-only.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Credential`] when writing or changing
    /// permissions fails.
    pub fn store(&mut self, secret: &str) -> Result<(), RemoteError> {
        let handle = self.file.as_file_mut();
        handle.set_len(0).map_err(credential_error)?;
        handle.rewind().map_err(credential_error)?;
        handle
            .write_all(secret.as_bytes())
            .map_err(credential_error)?;
        handle.flush().map_err(credential_error)?;
        restrict_to_owner(handle).map_err(credential_error)
    }
}

#[cfg(unix)]
fn restrict_to_owner(file: &File) -> io::Result<()> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(Permissions::from_mode(0o400))
}

#[cfg(not(unix))]
fn restrict_to_owner(file: &File) -> io::Result<()> {
    let mut permissions = file.metadata()?.permissions();
    permissions.set_readonly(true);
    file.set_permissions(permissions)
}

fn credential_error(err: io::Error) -> RemoteError {
    RemoteError::Credential {
        message: err.to_string(),
    }
}

/// Builds the full SSH argument vector, program first.
///
/// The credential is written into `credential` before the arguments are
/// produced. The layout is
/// `[sshpass -f <file> ssh | ssh -i <file>] [-p <port>] -o
/// StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null [<user>@<host>]
/// <extra...>`. `extra` is appended verbatim; no quoting happens here.
///
/// # Errors
///
/// Returns [`RemoteError::Credential`] when the secret cannot be stored.
pub fn build_ssh_command(
    tools: &ToolPaths,
    config: &RemoteConfig,
    auth: &ResolvedAuth,
    credential: &mut CredentialFile,
    include_address: bool,
    extra: &[&str],
) -> Result<Vec<String>, RemoteError> {
    credential.store(auth.secret())?;

    let mut args = authenticated_ssh_prefix(tools, config, auth, credential.path());
    if include_address {
        args.push(config.login());
    }
    args.extend(extra.iter().map(|token| (*token).to_owned()));
    Ok(args)
}

/// Credential flags plus the SSH client invocation, without a login target.
pub(crate) fn authenticated_ssh_prefix(
    tools: &ToolPaths,
    config: &RemoteConfig,
    auth: &ResolvedAuth,
    credential_path: &Utf8Path,
) -> Vec<String> {
    match auth {
        ResolvedAuth::Password(_) => {
            let mut args = vec![
                tools.sshpass_bin.clone(),
                String::from("-f"),
                credential_path.to_string(),
            ];
            args.extend(ssh_client_args(tools, config, None));
            args
        }
        ResolvedAuth::Key(_) => ssh_client_args(tools, config, Some(credential_path)),
    }
}

/// The SSH client with its identity, port, and host key options.
pub(crate) fn ssh_client_args(
    tools: &ToolPaths,
    config: &RemoteConfig,
    identity: Option<&Utf8Path>,
) -> Vec<String> {
    let mut args = vec![tools.ssh_bin.clone()];
    if let Some(identity_file) = identity {
        args.push(String::from("-i"));
        args.push(identity_file.to_string());
    }
    if let Some(port) = config.port {
        args.push(String::from("-p"));
        args.push(port.to_string());
    }
    args.extend(HOST_KEY_OPTIONS.iter().map(|option| (*option).to_owned()));
    args
}
