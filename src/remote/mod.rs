//! Remote command execution over SSH with failure classification.

use std::ffi::OsString;
use std::time::Duration;

use shell_escape::unix::escape;
use tracing::{debug, warn};

use crate::auth;
use crate::config::{AuthParameters, RemoteConfig};
use crate::error::{NOT_FOUND_MARKER, RemoteError};
use crate::process::{CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::ssh::{CredentialFile, ToolPaths, build_ssh_command};

/// How long the remote write pipeline may take before it is abandoned.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs commands on a remote host through the system SSH client.
///
/// Each call resolves credentials, writes them to a fresh
/// [`CredentialFile`], and drops that file before returning.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    runner: R,
    tools: ToolPaths,
    write_timeout: Duration,
}

impl RemoteExecutor<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner() -> Self {
        Self::new(ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor using default tool names and write timeout.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            tools: ToolPaths::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Overrides the executables used for SSH and rsync.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Overrides the deadline applied to [`RemoteExecutor::write`].
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Returns the configured executables.
    #[must_use]
    pub const fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Runs `command` on the remote and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfiguration`] when no credential can be
    /// resolved, [`RemoteError::NotFound`] when the remote reports a missing
    /// path, and [`RemoteError::RemoteCommandFailed`] for any other failure.
    ///
    /// # Security
    ///
    /// Each token is shell-quoted before it reaches the SSH client, so the
    /// remote shell sees exactly these words. Shell syntax in a token is
    /// never interpreted.
    pub fn run(
        &self,
        config: &RemoteConfig,
        parameters: &AuthParameters,
        command: &[&str],
    ) -> Result<String, RemoteError> {
        let auth = auth::resolve(config, parameters)?;
        let mut credential = CredentialFile::create()?;
        let quoted = quote_words(command);
        let argv = build_ssh_command(
            &self.tools,
            config,
            &auth,
            &mut credential,
            true,
            &as_strs(&quoted),
        )?;
        let (program, args) = split_program(&argv)?;
        let rendered = argv.join(" ");

        debug!(%program, command = %rendered, "running remote command");
        let output = self.runner.run(program, &args)?;
        classify(&rendered, output).map(|success| success.stdout)
    }

    /// Writes `content` to `remote_path` by piping it into
    /// `sh -c 'cat > <remote_path>'` on the remote.
    ///
    /// The path is quoted inside the script and the script is quoted again
    /// as a single word for the login shell.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Timeout`] when the pipeline has not exited
    /// within the write timeout, otherwise the same errors as
    /// [`RemoteExecutor::run`].
    pub fn write(
        &self,
        config: &RemoteConfig,
        parameters: &AuthParameters,
        remote_path: &str,
        content: &str,
    ) -> Result<(), RemoteError> {
        let pipeline = format!("cat > {}", escape(remote_path.into()));
        let auth = auth::resolve(config, parameters)?;
        let mut credential = CredentialFile::create()?;
        let quoted = quote_words(&["sh", "-c", pipeline.as_str()]);
        let argv = build_ssh_command(
            &self.tools,
            config,
            &auth,
            &mut credential,
            true,
            &as_strs(&quoted),
        )?;
        let (program, args) = split_program(&argv)?;
        let rendered = argv.join(" ");

        debug!(%program, command = %rendered, bytes = content.len(), "writing remote file");
        let Some(output) =
            self.runner
                .run_with_input(program, &args, content.as_bytes(), self.write_timeout)?
        else {
            warn!(command = %rendered, path = %remote_path, "remote write timed out");
            return Err(RemoteError::Timeout {
                command: rendered,
                timeout: self.write_timeout,
            });
        };
        classify(&rendered, output).map(|_| ())
    }
}

/// Shell-quotes each word for the remote login shell.
fn quote_words(words: &[&str]) -> Vec<String> {
    words
        .iter()
        .map(|word| escape((*word).into()).into_owned())
        .collect()
}

fn as_strs(words: &[String]) -> Vec<&str> {
    words.iter().map(String::as_str).collect()
}

/// Splits an argument vector into the program and its arguments.
pub(crate) fn split_program(argv: &[String]) -> Result<(&str, Vec<OsString>), RemoteError> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| RemoteError::invalid("empty command line"))?;
    Ok((program.as_str(), rest.iter().map(OsString::from).collect()))
}

/// Maps a finished command onto success, [`RemoteError::NotFound`], or
/// [`RemoteError::RemoteCommandFailed`].
///
/// "Not found" is detected by matching the shell's wording in the captured
/// output, so it depends on the remote locale.
pub(crate) fn classify(command: &str, output: CommandOutput) -> Result<CommandOutput, RemoteError> {
    if output.is_success() {
        return Ok(output);
    }

    let captured = output.combined();
    if captured.contains(NOT_FOUND_MARKER) {
        return Err(RemoteError::NotFound {
            command: command.to_owned(),
            output: captured,
        });
    }

    let status_text = output
        .code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    Err(RemoteError::RemoteCommandFailed {
        command: command.to_owned(),
        status: output.code,
        status_text,
        output: captured,
    })
}
