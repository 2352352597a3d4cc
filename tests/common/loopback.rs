//! In-process stand-in for an SSH remote backed by a scratch directory.
//!
//! The runner understands exactly the remote commands the provider issues
//! (`cat`, `ls -1`, `mkdir -p`, `sh -c 'cat > <path>'`) and performs rsync
//! transfers as plain directory copies. Remote absolute paths are mapped
//! under the scratch root.
//!
//! Like `sshd`, it joins the words after the login with spaces and splits
//! them again with shell quoting rules. Unquoted shell syntax is refused
//! rather than interpreted.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ssh_remote::{CommandOutput, CommandRunner, RemoteConfig, RemoteError};
use tempfile::TempDir;

pub const USER: &str = "tester";
pub const HOST: &str = "loopback";
pub const BASE_PATH: &str = "/commits";

#[derive(Clone, Debug)]
pub struct LoopbackRemote {
    root: Utf8PathBuf,
    credentials: Rc<RefCell<Vec<Utf8PathBuf>>>,
    _tmp: Rc<TempDir>,
}

impl LoopbackRemote {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("create remote root: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("remote root is not UTF-8: {}", path.display()));
        Self {
            root,
            credentials: Rc::new(RefCell::new(Vec::new())),
            _tmp: Rc::new(tmp),
        }
    }

    pub fn config() -> RemoteConfig {
        RemoteConfig {
            password: Some(String::from("loopback-secret")),
            ..RemoteConfig::new(USER, HOST, BASE_PATH)
        }
    }

    /// Location of a remote path inside the scratch root.
    pub fn host_path(&self, remote: &str) -> Utf8PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    /// Credential files referenced by any invocation so far.
    pub fn credentials_seen(&self) -> Vec<Utf8PathBuf> {
        self.credentials.borrow().clone()
    }

    fn record_credential(&self, tokens: &[String]) {
        let found = tokens.windows(2).find_map(|pair| match pair {
            [flag, path] if flag == "-f" || flag == "-i" => Some(Utf8PathBuf::from(path)),
            _ => None,
        });
        if let Some(path) = found {
            self.credentials.borrow_mut().push(path);
        }
    }

    fn remote_command(program: &str, args: &[OsString]) -> Option<Vec<String>> {
        let login = format!("{USER}@{HOST}");
        let tokens = std::iter::once(program.to_owned())
            .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        let index = tokens.iter().position(|token| *token == login)?;
        let line = tokens.iter().skip(index + 1).cloned().collect::<Vec<_>>().join(" ");
        shell_words(&line)
    }

    fn execute(&self, command: Option<Vec<String>>, input: Option<&[u8]>) -> CommandOutput {
        let Some(command) = command else {
            return failure(2, String::from("sh: 1: unsupported shell syntax\n"));
        };
        let command = command.as_slice();
        let unprivileged = match command.split_first() {
            Some((first, rest)) if first == "sudo" => rest,
            _ => command,
        };
        let words = unprivileged.iter().map(String::as_str).collect::<Vec<_>>();
        match words.as_slice() {
            ["cat", path] => match fs::read_to_string(self.host_path(path)) {
                Ok(contents) => success(contents),
                Err(_) => failure(1, format!("cat: {path}: No such file or directory\n")),
            },
            ["ls", "-1", path] => self.list(path),
            ["mkdir", "-p", path] => match fs::create_dir_all(self.host_path(path)) {
                Ok(()) => success(String::new()),
                Err(err) => failure(1, format!("mkdir: {path}: {err}\n")),
            },
            ["sh", "-c", script] => self.write(script, input.unwrap_or_default()),
            _ => failure(127, format!("sh: 1: {}: not found\n", words.join(" "))),
        }
    }

    fn list(&self, path: &str) -> CommandOutput {
        let Ok(entries) = fs::read_dir(self.host_path(path)) else {
            return failure(
                2,
                format!("ls: cannot access '{path}': No such file or directory\n"),
            );
        };
        let mut names = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        success(names.iter().map(|name| format!("{name}\n")).collect())
    }

    fn write(&self, script: &str, input: &[u8]) -> CommandOutput {
        let target = script.strip_prefix("cat > ").and_then(shell_words);
        let Some([path]) = target.as_deref() else {
            return failure(2, format!("sh: unsupported script {script}\n"));
        };
        match fs::write(self.host_path(path), input) {
            Ok(()) => success(String::new()),
            Err(_) => failure(2, format!("sh: 1: cannot create {path}: Directory nonexistent\n")),
        }
    }

    fn endpoint(&self, endpoint: &str) -> Utf8PathBuf {
        let remote_prefix = format!("{USER}@{HOST}:");
        endpoint.strip_prefix(&remote_prefix).map_or_else(
            || Utf8PathBuf::from(endpoint),
            |remote| self.host_path(remote),
        )
    }
}

impl CommandRunner for LoopbackRemote {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let tokens = std::iter::once(program.to_owned())
            .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        self.record_credential(&tokens);
        Ok(self.execute(Self::remote_command(program, args), None))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
        _timeout: Duration,
    ) -> Result<Option<CommandOutput>, RemoteError> {
        let tokens = std::iter::once(program.to_owned())
            .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        self.record_credential(&tokens);
        Ok(Some(
            self.execute(Self::remote_command(program, args), Some(input)),
        ))
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, RemoteError> {
        let tokens = std::iter::once(program.to_owned())
            .chain(
                args.iter()
                    .flat_map(|arg| {
                        arg.to_string_lossy()
                            .split_whitespace()
                            .map(str::to_owned)
                            .collect::<Vec<_>>()
                    }),
            )
            .collect::<Vec<_>>();
        self.record_credential(&tokens);

        let mut endpoints = args.iter().rev().take(2).map(|arg| arg.to_string_lossy());
        let (Some(destination), Some(source)) = (endpoints.next(), endpoints.next()) else {
            return Ok(failure(1, String::from("rsync: missing endpoints\n")));
        };
        let source_dir = self.endpoint(&source);
        let destination_dir = self.endpoint(&destination);

        let copied = mirror(&source_dir, &destination_dir).map_err(|err| RemoteError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        })?;
        let line = format!("     {copied} 100%    1.00MB/s    0:00:00 (xfr#1, to-chk=0/1)");
        on_line(&line);
        Ok(success(format!("{line}\n")))
    }
}

/// Splits `line` into words using single quotes and backslashes.
///
/// Returns `None` for anything a real shell would expand or treat as an
/// operator.
fn shell_words(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                let word = current.get_or_insert_with(String::new);
                loop {
                    match chars.next()? {
                        '\'' => break,
                        quoted => word.push(quoted),
                    }
                }
            }
            '\\' => current.get_or_insert_with(String::new).push(chars.next()?),
            ' ' | '\t' | '\n' => words.extend(current.take()),
            '"' | '$' | '`' | ';' | '&' | '|' | '<' | '>' | '(' | ')' | '*' | '?' => {
                return None;
            }
            other => current.get_or_insert_with(String::new).push(other),
        }
    }
    words.extend(current.take());
    Some(words)
}

/// Replaces `destination` with a copy of `source`, returning bytes copied.
fn mirror(source: &Utf8Path, destination: &Utf8Path) -> io::Result<u64> {
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    fs::create_dir_all(destination)?;
    let mut copied = 0;
    for item in fs::read_dir(source)? {
        let entry = item?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let from = source.join(&name);
        let to = destination.join(&name);
        if entry.file_type()?.is_dir() {
            copied += mirror(&from, &to)?;
        } else {
            copied += fs::copy(&from, &to)?;
        }
    }
    Ok(copied)
}

fn success(stdout: String) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout,
        stderr: String::new(),
    }
}

fn failure(code: i32, stderr: String) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr,
    }
}
