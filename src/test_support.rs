//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::rc::Rc;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::{Map, Value, json};

use crate::commit::Commit;
use crate::error::RemoteError;
use crate::process::{CommandOutput, CommandRunner};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Every invocation is recorded together with a snapshot of the credential
/// file it referenced, taken while the file still existed.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<ScriptedResponse>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

#[derive(Clone, Debug)]
enum ScriptedResponse {
    Output(CommandOutput),
    Timeout,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Bytes written to standard input, for `run_with_input` calls.
    pub input: Option<String>,
    /// Credential file referenced by `-f` or `-i`, if any.
    pub credential: Option<CredentialSnapshot>,
}

/// State of a credential file at the moment a command ran.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialSnapshot {
    /// Location of the credential file.
    pub path: Utf8PathBuf,
    /// File contents, if the file could be read.
    pub contents: Option<String>,
    /// Unix permission bits, if available.
    pub mode: Option<u32>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.arg_strings());
        parts.join(" ")
    }

    /// Returns the arguments as owned strings.
    #[must_use]
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes the failure `cat` reports for a missing file.
    pub fn push_not_found(&self, path: &str) {
        self.push_output(
            Some(1),
            "",
            format!("cat: {path}: No such file or directory\n"),
        );
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Makes the next `run_with_input` call report that the deadline passed.
    pub fn push_timeout(&self) {
        self.responses
            .borrow_mut()
            .push_back(ScriptedResponse::Timeout);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses
            .borrow_mut()
            .push_back(ScriptedResponse::Output(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }));
    }

    fn record(&self, program: &str, args: &[OsString], input: Option<&[u8]>) {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            input: input.map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            credential: snapshot_credential(program, args),
        });
    }

    fn next_response(&self, program: &str) -> Result<ScriptedResponse, RemoteError> {
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }

    fn next_output(&self, program: &str) -> Result<CommandOutput, RemoteError> {
        match self.next_response(program)? {
            ScriptedResponse::Output(output) => Ok(output),
            ScriptedResponse::Timeout => Err(RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("timeout scripted for a command without a deadline"),
            }),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        self.record(program, args, None);
        self.next_output(program)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
        _timeout: Duration,
    ) -> Result<Option<CommandOutput>, RemoteError> {
        self.record(program, args, Some(input));
        match self.next_response(program)? {
            ScriptedResponse::Output(output) => Ok(Some(output)),
            ScriptedResponse::Timeout => Ok(None),
        }
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, RemoteError> {
        self.record(program, args, None);
        let output = self.next_output(program)?;
        output
            .stdout
            .split(['\n', '\r'])
            .filter(|line| !line.is_empty())
            .for_each(|line| on_line(line));
        Ok(output)
    }
}

fn snapshot_credential(program: &str, args: &[OsString]) -> Option<CredentialSnapshot> {
    let tokens = std::iter::once(program.to_owned())
        .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
        .flat_map(|arg| {
            arg.split_whitespace()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let path = tokens
        .windows(2)
        .find_map(|pair| match pair {
            [flag, path] if flag == "-f" || flag == "-i" => Some(Utf8PathBuf::from(path)),
            _ => None,
        })?;

    let contents = std::fs::read_to_string(&path).ok();
    let mode = file_mode(&path);
    Some(CredentialSnapshot {
        path,
        contents,
        mode,
    })
}

#[cfg(unix)]
fn file_mode(path: &Utf8PathBuf) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .ok()
        .map(|metadata| metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Utf8PathBuf) -> Option<u32> {
    None
}

/// Builds commit metadata with a timestamp and tag set.
#[must_use]
pub fn commit_metadata(timestamp: &str, tags: &[(&str, Option<&str>)]) -> Commit {
    let tag_map = tags
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.map_or(Value::Null, Value::from)))
        .collect::<Map<String, Value>>();
    let mut metadata = Map::new();
    metadata.insert(String::from("timestamp"), json!(timestamp));
    metadata.insert(String::from("tags"), Value::Object(tag_map));
    Commit::from(metadata)
}

/// Renders commit metadata as the JSON document stored on the remote.
#[must_use]
pub fn commit_json(timestamp: &str, tags: &[(&str, Option<&str>)]) -> String {
    Value::Object(commit_metadata(timestamp, tags).into_inner()).to_string()
}
