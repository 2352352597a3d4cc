//! rsync invocation building and progress parsing.
//!
//! rsync reaches the remote through its own `--rsh` SSH client, which is
//! given the same port, identity, and host key options as plain SSH
//! commands. Password authentication wraps the whole rsync process in
//! `sshpass` so the prompt raised by rsync's SSH child is answered.

use std::fmt;

use camino::Utf8Path;
use shell_escape::unix::escape;

use crate::auth::ResolvedAuth;
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::layout::rsync_endpoint;
use crate::ssh::{CredentialFile, ToolPaths, ssh_client_args};

const RSYNC_FLAGS: [&str; 3] = ["-aS", "--delete", "--info=progress2"];

/// Direction of a volume transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncDirection {
    /// Local data is uploaded to the remote.
    Push,
    /// Remote data is downloaded to the local path.
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Pull => f.write_str("pull"),
        }
    }
}

/// One progress sample emitted by `rsync --info=progress2`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferProgress {
    /// Bytes transferred so far.
    pub bytes: u64,
    /// Overall completion percentage.
    pub percent: u8,
    /// Transfer rate as printed by rsync, for example `1.23MB/s`.
    pub rate: Option<String>,
}

/// Receives progress while a transfer runs.
pub trait ProgressReporter {
    /// Called once before the transfer starts.
    fn start(&mut self, _message: &str) {}

    /// Called for every progress sample.
    fn update(&mut self, progress: &TransferProgress);

    /// Called once after a successful transfer.
    fn end(&mut self) {}
}

impl<F: FnMut(&TransferProgress)> ProgressReporter for F {
    fn update(&mut self, progress: &TransferProgress) {
        self(progress);
    }
}

/// Reporter that discards all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&mut self, _progress: &TransferProgress) {}
}

/// Parses a `--info=progress2` line such as
/// `  1,238,099  42%  146.38MB/s  0:00:00 (xfr#5, to-chk=0/6)`.
#[must_use]
pub fn parse_progress(line: &str) -> Option<TransferProgress> {
    let mut fields = line.split_whitespace();
    let bytes = fields.next()?.replace(',', "").parse::<u64>().ok()?;
    let percent = fields.next()?.strip_suffix('%')?.parse::<u8>().ok()?;
    let rate = fields
        .next()
        .filter(|field| field.ends_with("/s"))
        .map(str::to_owned);
    Some(TransferProgress {
        bytes,
        percent,
        rate,
    })
}

/// Builds the full rsync argument vector, program first, writing the
/// credential into `credential` beforehand.
///
/// PUSH copies `<local_path>/` to `<user>@<host>:<remote_dir>/`; PULL copies
/// the other way.
///
/// # Errors
///
/// Returns [`RemoteError::Credential`] when the secret cannot be stored.
pub fn build_rsync_command(
    tools: &ToolPaths,
    config: &RemoteConfig,
    auth: &ResolvedAuth,
    credential: &mut CredentialFile,
    direction: SyncDirection,
    local_path: &Utf8Path,
    remote_dir: &str,
) -> Result<Vec<String>, RemoteError> {
    credential.store(auth.secret())?;

    let identity = match auth {
        ResolvedAuth::Key(_) => Some(credential.path()),
        ResolvedAuth::Password(_) => None,
    };
    let remote_shell = ssh_client_args(tools, config, identity)
        .iter()
        .map(|arg| escape(arg.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    let mut argv = Vec::new();
    if auth.is_password() {
        argv.push(tools.sshpass_bin.clone());
        argv.push(String::from("-f"));
        argv.push(credential.path().to_string());
    }
    argv.push(tools.rsync_bin.clone());
    argv.extend(RSYNC_FLAGS.iter().map(|flag| (*flag).to_owned()));
    argv.push(String::from("--rsh"));
    argv.push(remote_shell);

    let local = format!("{}/", local_path.as_str().trim_end_matches('/'));
    let remote = rsync_endpoint(config, remote_dir);
    match direction {
        SyncDirection::Push => argv.extend([local, remote]),
        SyncDirection::Pull => argv.extend([remote, local]),
    }
    Ok(argv)
}
