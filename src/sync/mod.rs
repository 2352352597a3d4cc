//! Volume transfers between a local directory and a commit on the remote.
//!
//! A PUSH first creates the volume directory on the remote and then runs
//! rsync from the local path; a PULL runs rsync in the opposite direction
//! without touching the remote layout.

use camino::Utf8PathBuf;
use tracing::info;

use crate::auth;
use crate::config::{AuthParameters, RemoteConfig};
use crate::error::RemoteError;
use crate::layout::volume_dir;
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::remote::{RemoteExecutor, classify, split_program};
use crate::rsync::{ProgressReporter, SyncDirection, build_rsync_command, parse_progress};
use crate::ssh::CredentialFile;

/// Everything needed to transfer one volume of one commit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncOperation {
    /// Transfer direction.
    pub direction: SyncDirection,
    /// Remote the commit lives on.
    pub remote: RemoteConfig,
    /// Per-call authentication material.
    pub parameters: AuthParameters,
    /// Commit the volume belongs to.
    pub commit_id: String,
    /// Volume name within the commit.
    pub volume: String,
    /// Local directory holding the volume data.
    pub local_path: Utf8PathBuf,
}

impl SyncOperation {
    /// Remote directory holding this operation's volume data.
    #[must_use]
    pub fn remote_dir(&self) -> String {
        volume_dir(&self.remote.path, &self.commit_id, &self.volume)
    }
}

/// Runs the preparation and rsync steps of a volume transfer.
#[derive(Clone, Debug)]
pub struct SyncOrchestrator<R: CommandRunner> {
    executor: RemoteExecutor<R>,
    elevate_mkdir: bool,
}

impl SyncOrchestrator<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner() -> Self {
        Self::new(RemoteExecutor::with_process_runner())
    }
}

impl<R: CommandRunner> SyncOrchestrator<R> {
    /// Creates an orchestrator that prefixes `mkdir` with `sudo`.
    #[must_use]
    pub const fn new(executor: RemoteExecutor<R>) -> Self {
        Self {
            executor,
            elevate_mkdir: true,
        }
    }

    /// Controls whether the PUSH `mkdir` runs under `sudo`.
    #[must_use]
    pub const fn with_elevated_mkdir(mut self, elevate: bool) -> Self {
        self.elevate_mkdir = elevate;
        self
    }

    /// Returns the executor used for remote commands.
    #[must_use]
    pub const fn executor(&self) -> &RemoteExecutor<R> {
        &self.executor
    }

    /// Creates the remote volume directory for a PUSH. PULL is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`RemoteExecutor::run`].
    pub fn prepare(&self, operation: &SyncOperation) -> Result<(), RemoteError> {
        if operation.direction == SyncDirection::Pull {
            return Ok(());
        }

        let remote_dir = operation.remote_dir();
        let mut command = Vec::with_capacity(4);
        if self.elevate_mkdir {
            command.push("sudo");
        }
        command.extend(["mkdir", "-p", remote_dir.as_str()]);
        self.executor
            .run(&operation.remote, &operation.parameters, &command)
            .map(|_| ())
    }

    /// Prepares the remote and transfers the volume, forwarding rsync
    /// progress to `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfiguration`] when no credential can be
    /// resolved and [`RemoteError::RemoteCommandFailed`] or
    /// [`RemoteError::NotFound`] when `mkdir` or rsync fails.
    pub fn sync_volume(
        &self,
        operation: &SyncOperation,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), RemoteError> {
        let auth = auth::resolve(&operation.remote, &operation.parameters)?;
        self.prepare(operation)?;

        let mut credential = CredentialFile::create()?;
        let argv = build_rsync_command(
            self.executor.tools(),
            &operation.remote,
            &auth,
            &mut credential,
            operation.direction,
            &operation.local_path,
            &operation.remote_dir(),
        )?;
        let (program, args) = split_program(&argv)?;
        let rendered = argv.join(" ");

        info!(
            commit_id = %operation.commit_id,
            volume = %operation.volume,
            direction = %operation.direction,
            "starting volume transfer"
        );
        progress.start(&format!("{} volume {}", operation.direction, operation.volume));
        let output = self.executor.runner().run_streaming(program, &args, &mut |line| {
            if let Some(sample) = parse_progress(line) {
                progress.update(&sample);
            }
        })?;
        classify(&rendered, output)?;
        progress.end();
        info!(
            commit_id = %operation.commit_id,
            volume = %operation.volume,
            direction = %operation.direction,
            "finished volume transfer"
        );
        Ok(())
    }
}
