//! Binary entry point for the `ssh-remote` CLI.

use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use ssh_remote::{
    AuthParameters, Commit, ProgressReporter, RemoteConfig, RemoteError, RemoteExecutor,
    RemoteProvider, RemoteSettings, SshProvider, SyncDirection, SyncOperation, TagMatch,
    TransferProgress,
};

mod cli;

use cli::{Cli, Command, PutMetadataCommand, TransferCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to read {path}: {message}")]
    Io { path: Utf8PathBuf, message: String },
    #[error("{path} does not hold a JSON object: {message}")]
    InvalidMetadata { path: Utf8PathBuf, message: String },
    #[error("commit {0} not found")]
    CommitNotFound(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("failed to write output: {0}")]
    Output(String),
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let exit_code = match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let settings =
        RemoteSettings::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let remote = settings
        .remote()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let parameters = auth_parameters(&remote, cli.password, cli.key_file.as_deref())?;
    let provider =
        SshProvider::new(RemoteExecutor::with_process_runner().with_tools(settings.tools()))
            .with_elevated_mkdir(settings.elevate_mkdir);

    let mut stdout = io::stdout();
    match cli.command {
        Command::List(args) => list_commits(&provider, &remote, &parameters, &args.tags, &mut stdout),
        Command::Get(args) => get_commit(&provider, &remote, &parameters, &args.commit, &mut stdout),
        Command::PutMetadata(args) => put_metadata(&provider, &remote, &parameters, &args),
        Command::Push(args) => transfer(&provider, SyncDirection::Push, remote, parameters, args),
        Command::Pull(args) => transfer(&provider, SyncDirection::Pull, remote, parameters, args),
    }
}

/// A key file is read only when it can take part in authentication: it was
/// named explicitly, or no password is available from either source.
///
/// A stored password always wins over a key, so naming a key file while one
/// is stored is rejected instead of being ignored.
fn auth_parameters(
    remote: &RemoteConfig,
    password: Option<String>,
    key_file: Option<&str>,
) -> Result<AuthParameters, CliError> {
    if key_file.is_some() && password.is_none() && remote.password.is_some() {
        return Err(CliError::Config(String::from(
            "--key-file cannot be used while a password is stored; \
             remove password from the settings file or pass --password instead",
        )));
    }
    let stored_key = remote
        .key_file
        .as_deref()
        .filter(|_| password.is_none() && remote.password.is_none());
    let key = key_file
        .or(stored_key)
        .map(|path| read_local_file(Utf8Path::new(path)))
        .transpose()?;
    Ok(AuthParameters { password, key })
}

fn list_commits(
    provider: &dyn RemoteProvider,
    remote: &RemoteConfig,
    parameters: &AuthParameters,
    tags: &[String],
    out: &mut impl Write,
) -> Result<(), CliError> {
    let filter = tags
        .iter()
        .map(|tag| tag.parse::<TagMatch>())
        .collect::<Result<Vec<_>, _>>()?;
    let commits = provider
        .list_commits(remote, parameters, &filter)?
        .into_iter()
        .map(|(id, commit)| json!({ "id": id, "metadata": Value::Object(commit.into_inner()) }))
        .collect::<Vec<_>>();
    write_json(out, &Value::Array(commits))
}

fn get_commit(
    provider: &dyn RemoteProvider,
    remote: &RemoteConfig,
    parameters: &AuthParameters,
    commit_id: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let commit = provider
        .get_commit(remote, parameters, commit_id)?
        .ok_or_else(|| CliError::CommitNotFound(commit_id.to_owned()))?;
    write_json(out, &Value::Object(commit.into_inner()))
}

fn put_metadata(
    provider: &dyn RemoteProvider,
    remote: &RemoteConfig,
    parameters: &AuthParameters,
    args: &PutMetadataCommand,
) -> Result<(), CliError> {
    let path = Utf8Path::new(&args.file);
    let document = read_local_file(path)?;
    let metadata = serde_json::from_str::<Map<String, Value>>(&document).map_err(|err| {
        CliError::InvalidMetadata {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    provider.push_metadata(
        remote,
        parameters,
        &args.commit,
        &Commit::new(metadata),
        args.update,
    )?;
    Ok(())
}

fn transfer(
    provider: &dyn RemoteProvider,
    direction: SyncDirection,
    remote: RemoteConfig,
    parameters: AuthParameters,
    args: TransferCommand,
) -> Result<(), CliError> {
    let operation = SyncOperation {
        direction,
        remote,
        parameters,
        commit_id: args.commit,
        volume: args.volume,
        local_path: Utf8PathBuf::from(args.path),
    };
    provider.sync_start(&operation)?;
    provider.sync_volume(&operation, &mut StderrProgress::new(io::stderr()))?;
    provider.sync_end(&operation)?;
    Ok(())
}

/// Renders transfer progress as a single, continuously rewritten line.
struct StderrProgress<W: Write> {
    target: W,
}

impl<W: Write> StderrProgress<W> {
    const fn new(target: W) -> Self {
        Self { target }
    }
}

impl<W: Write> ProgressReporter for StderrProgress<W> {
    fn start(&mut self, message: &str) {
        writeln!(self.target, "{message}").ok();
    }

    fn update(&mut self, progress: &TransferProgress) {
        let rate = progress.rate.as_deref().unwrap_or("");
        write!(
            self.target,
            "\r{:>3}% {} bytes {rate}",
            progress.percent, progress.bytes
        )
        .ok();
        self.target.flush().ok();
    }

    fn end(&mut self) {
        writeln!(self.target).ok();
    }
}

fn read_local_file(path: &Utf8Path) -> Result<String, CliError> {
    let io_error = |message: String| CliError::Io {
        path: path.to_path_buf(),
        message,
    };
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io_error(String::from("path is missing a file name")))?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| io_error(err.to_string()))
}

fn write_json(out: &mut impl Write, value: &Value) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(out, "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
