//! Command-line interface definitions for the `ssh-remote` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `ssh-remote` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ssh-remote",
    about = "Read and write volume commits stored on an SSH remote",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Password for the remote; overrides any stored password.
    #[arg(
        long,
        global = true,
        env = "SSH_REMOTE_PASSWORD",
        hide_env_values = true,
        value_name = "PASSWORD"
    )]
    pub(crate) password: Option<String>,
    /// Private key file to authenticate with. Rejected while a password is
    /// stored, since a stored password takes precedence over any key.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) key_file: Option<String>,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `ssh-remote`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List commits, newest first.
    #[command(name = "list", about = "List commits, newest first")]
    List(ListCommand),
    /// Print the metadata of one commit.
    #[command(name = "get", about = "Print the metadata of one commit")]
    Get(GetCommand),
    /// Store a commit's metadata from a local JSON file.
    #[command(name = "put-metadata", about = "Store a commit's metadata from a JSON file")]
    PutMetadata(PutMetadataCommand),
    /// Upload a local directory as a volume of a commit.
    #[command(name = "push", about = "Upload a local directory as a commit volume")]
    Push(TransferCommand),
    /// Download a volume of a commit into a local directory.
    #[command(name = "pull", about = "Download a commit volume into a local directory")]
    Pull(TransferCommand),
}

/// Arguments for `ssh-remote list`.
#[derive(Debug, Args)]
pub(crate) struct ListCommand {
    /// Only list commits carrying this tag, optionally with a value
    /// (`key` or `key=value`). Repeat to require several tags.
    #[arg(long = "tag", value_name = "KEY[=VALUE]")]
    pub(crate) tags: Vec<String>,
}

/// Arguments for `ssh-remote get`.
#[derive(Debug, Args)]
pub(crate) struct GetCommand {
    /// Commit identifier.
    pub(crate) commit: String,
}

/// Arguments for `ssh-remote put-metadata`.
#[derive(Debug, Args)]
pub(crate) struct PutMetadataCommand {
    /// Commit identifier.
    pub(crate) commit: String,
    /// JSON file holding the metadata object.
    pub(crate) file: String,
    /// Overwrite metadata of an existing commit without creating its
    /// directory.
    #[arg(long)]
    pub(crate) update: bool,
}

/// Arguments shared by `ssh-remote push` and `ssh-remote pull`.
#[derive(Debug, Args)]
pub(crate) struct TransferCommand {
    /// Commit identifier.
    pub(crate) commit: String,
    /// Volume name within the commit.
    pub(crate) volume: String,
    /// Local directory holding the volume data.
    pub(crate) path: String,
}
