//! SSH-backed remote storage for versioned volume commits.
//!
//! A commit lives on the remote as `<base>/<commit>/metadata.json` plus one
//! directory per volume under `<base>/<commit>/data/`. Metadata travels over
//! plain SSH commands; volume data travels over rsync tunnelled through SSH.
//! [`SshProvider`] ties the pieces together behind the [`RemoteProvider`]
//! interface a host application drives.

pub mod auth;
pub mod commit;
pub mod config;
pub mod error;
pub mod layout;
pub mod process;
pub mod provider;
pub mod remote;
pub mod rsync;
pub mod settings;
pub mod ssh;
pub mod sync;
pub mod test_support;

pub use auth::ResolvedAuth;
pub use commit::{Commit, CommitStore, TagMatch};
pub use config::{AuthParameters, RawMap, RemoteConfig, validate_parameters, validate_remote};
pub use error::RemoteError;
pub use process::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use provider::{RemoteProvider, SSH_PROVIDER, SshProvider};
pub use remote::{DEFAULT_WRITE_TIMEOUT, RemoteExecutor};
pub use rsync::{NoProgress, ProgressReporter, SyncDirection, TransferProgress};
pub use settings::{RemoteSettings, SettingsLoadError};
pub use ssh::{CredentialFile, ToolPaths};
pub use sync::{SyncOperation, SyncOrchestrator};
