//! External process execution behind a narrow, fakeable trait.

use std::ffi::OsString;
use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RemoteError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;

    /// Runs `program`, feeds `input` to its standard input, closes it, and
    /// waits up to `timeout` for the process to exit.
    ///
    /// Returns `Ok(None)` when the process was still running at the deadline;
    /// it is killed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started or
    /// waited on.
    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Option<CommandOutput>, RemoteError>;

    /// Runs `program`, handing every line of standard output to `on_line` as
    /// it arrives. Carriage returns terminate lines as well, so in-place
    /// progress updates are delivered individually.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, RemoteError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Option<CommandOutput>, RemoteError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;

        let stdout = child.stdout.take().map(capture);
        let stderr = child.stderr.take().map(capture);
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = input.to_vec();
            // A child that exits without reading closes the pipe; its exit
            // status is reported instead of the write error.
            thread::spawn(move || stdin.write_all(&payload))
        });

        let Some(status) = wait_with_deadline(&mut child, timeout)
            .map_err(|err| spawn_error(program, &err))?
        else {
            child.kill().ok();
            child.wait().ok();
            return Ok(None);
        };

        if let Some(handle) = writer {
            handle.join().ok();
        }

        Ok(Some(CommandOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        }))
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, RemoteError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;

        let stderr = child.stderr.take().map(capture);
        let stdout = match child.stdout.take() {
            Some(pipe) => forward_lines(pipe, on_line).map_err(|err| spawn_error(program, &err))?,
            None => Vec::new(),
        };
        let status = child.wait().map_err(|err| spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: collect(stderr),
        })
    }
}

fn spawn_error(program: &str, err: &io::Error) -> RemoteError {
    RemoteError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn capture<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> String {
    handle
        .and_then(|reader| reader.join().ok())
        .and_then(Result::ok)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Copies `pipe` into a buffer while emitting each non-empty `\n`- or
/// `\r`-terminated line.
pub(crate) fn forward_lines(
    mut pipe: impl Read,
    on_line: &mut dyn FnMut(&str),
) -> io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        let read = match pipe.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let bytes = chunk.get(..read).unwrap_or_default();
        captured.extend_from_slice(bytes);
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                emit_line(&mut pending, on_line);
            } else {
                pending.push(byte);
            }
        }
    }

    emit_line(&mut pending, on_line);
    Ok(captured)
}

fn emit_line(pending: &mut Vec<u8>, on_line: &mut dyn FnMut(&str)) {
    if pending.is_empty() {
        return;
    }
    {
        let line = String::from_utf8_lossy(pending);
        on_line(&*line);
    }
    pending.clear();
}
