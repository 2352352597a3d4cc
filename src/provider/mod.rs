//! The provider interface the host application drives, and its SSH variant.

use tracing::debug;

use crate::commit::{Commit, CommitStore, TagMatch};
use crate::config::{self, AuthParameters, RawMap, RemoteConfig};
use crate::error::RemoteError;
use crate::layout::{commit_dir, rsync_endpoint, volume_dir};
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::remote::RemoteExecutor;
use crate::rsync::ProgressReporter;
use crate::sync::{SyncOperation, SyncOrchestrator};

/// Name the SSH provider registers under.
pub const SSH_PROVIDER: &str = "ssh";

/// Operations a remote-storage provider offers to the host application.
pub trait RemoteProvider {
    /// Provider identifier.
    fn provider(&self) -> &'static str;

    /// Validates a raw remote mapping.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfiguration`] for malformed input.
    fn validate_remote(&self, raw: &RawMap) -> Result<RemoteConfig, RemoteError>;

    /// Validates raw per-call parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfiguration`] for malformed input.
    fn validate_parameters(&self, raw: &RawMap) -> Result<AuthParameters, RemoteError>;

    /// Fetches one commit, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Propagates remote and decoding failures.
    fn get_commit(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
    ) -> Result<Option<Commit>, RemoteError>;

    /// Lists commits matching `tags`, newest first.
    ///
    /// # Errors
    ///
    /// Propagates remote and decoding failures.
    fn list_commits(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        tags: &[TagMatch],
    ) -> Result<Vec<(String, Commit)>, RemoteError>;

    /// Hook run before any volume of an operation is transferred.
    ///
    /// # Errors
    ///
    /// Implementations may fail to set up the transfer.
    fn sync_start(&self, _operation: &SyncOperation) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Transfers one volume.
    ///
    /// # Errors
    ///
    /// Propagates preparation and transfer failures.
    fn sync_volume(
        &self,
        operation: &SyncOperation,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), RemoteError>;

    /// Hook run after every volume has been transferred.
    ///
    /// # Errors
    ///
    /// Implementations may fail to finalise the transfer.
    fn sync_end(&self, _operation: &SyncOperation) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Stores a commit's metadata on the remote.
    ///
    /// # Errors
    ///
    /// Propagates encoding and remote failures.
    fn push_metadata(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
        commit: &Commit,
        is_update: bool,
    ) -> Result<(), RemoteError>;

    /// Remote directory of one volume of a commit.
    fn get_remote_path(&self, remote: &RemoteConfig, commit_id: &str, volume: &str) -> String;

    /// rsync endpoint for a remote directory.
    fn get_rsync_endpoint(&self, remote: &RemoteConfig, remote_dir: &str) -> String;
}

/// Remote provider reaching commits over SSH and rsync.
#[derive(Clone, Debug)]
pub struct SshProvider<R: CommandRunner + Clone> {
    store: CommitStore<R>,
    orchestrator: SyncOrchestrator<R>,
}

impl SshProvider<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner() -> Self {
        Self::new(RemoteExecutor::with_process_runner())
    }
}

impl<R: CommandRunner + Clone> SshProvider<R> {
    /// Creates a provider sharing `executor` between metadata and volume
    /// operations.
    #[must_use]
    pub fn new(executor: RemoteExecutor<R>) -> Self {
        Self {
            store: CommitStore::new(executor.clone()),
            orchestrator: SyncOrchestrator::new(executor),
        }
    }

    /// Controls whether PUSH transfers create directories under `sudo`.
    #[must_use]
    pub fn with_elevated_mkdir(mut self, elevate: bool) -> Self {
        self.orchestrator = self.orchestrator.with_elevated_mkdir(elevate);
        self
    }

    /// Returns the commit store.
    #[must_use]
    pub const fn store(&self) -> &CommitStore<R> {
        &self.store
    }
}

impl<R: CommandRunner + Clone> RemoteProvider for SshProvider<R> {
    fn provider(&self) -> &'static str {
        SSH_PROVIDER
    }

    fn validate_remote(&self, raw: &RawMap) -> Result<RemoteConfig, RemoteError> {
        config::validate_remote(raw)
    }

    fn validate_parameters(&self, raw: &RawMap) -> Result<AuthParameters, RemoteError> {
        config::validate_parameters(raw)
    }

    fn get_commit(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
    ) -> Result<Option<Commit>, RemoteError> {
        self.store.get_commit(remote, parameters, commit_id)
    }

    fn list_commits(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        tags: &[TagMatch],
    ) -> Result<Vec<(String, Commit)>, RemoteError> {
        self.store.list_commits(remote, parameters, tags)
    }

    fn sync_volume(
        &self,
        operation: &SyncOperation,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), RemoteError> {
        self.orchestrator.sync_volume(operation, progress)
    }

    fn push_metadata(
        &self,
        remote: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
        commit: &Commit,
        is_update: bool,
    ) -> Result<(), RemoteError> {
        if !is_update {
            let dir = commit_dir(&remote.path, commit_id);
            debug!(commit_id, dir = %dir, "creating commit directory");
            self.store
                .executor()
                .run(remote, parameters, &["mkdir", "-p", dir.as_str()])?;
        }
        self.store.put_metadata(remote, parameters, commit_id, commit)
    }

    fn get_remote_path(&self, remote: &RemoteConfig, commit_id: &str, volume: &str) -> String {
        volume_dir(&remote.path, commit_id, volume)
    }

    fn get_rsync_endpoint(&self, remote: &RemoteConfig, remote_dir: &str) -> String {
        rsync_endpoint(remote, remote_dir)
    }
}
