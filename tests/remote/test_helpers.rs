//! Shared fixtures for the SSH remote BDD scenarios.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use rstest::fixture;
use ssh_remote::{
    AuthParameters, Commit, RemoteConfig, RemoteError, RemoteExecutor, SshProvider,
    TransferProgress,
};
use tempfile::TempDir;

use crate::loopback::LoopbackRemote;

pub struct RemoteContext {
    pub remote: LoopbackRemote,
    pub provider: SshProvider<LoopbackRemote>,
    pub config: RefCell<RemoteConfig>,
    pub parameters: AuthParameters,
    pub local_volume: Utf8PathBuf,
    pub pulled_volume: Utf8PathBuf,
    pub fetched: RefCell<Option<Option<Commit>>>,
    pub listing: RefCell<Vec<String>>,
    pub progress: RefCell<Vec<TransferProgress>>,
    pub error: RefCell<Option<RemoteError>>,
    _workspace: TempDir,
}

#[fixture]
pub fn remote_context() -> RemoteContext {
    let remote = LoopbackRemote::new();
    let workspace = TempDir::new().unwrap_or_else(|err| panic!("create workspace: {err}"));
    let root = Utf8PathBuf::from_path_buf(workspace.path().to_path_buf())
        .unwrap_or_else(|path| panic!("workspace is not UTF-8: {}", path.display()));
    RemoteContext {
        provider: SshProvider::new(RemoteExecutor::new(remote.clone())),
        remote,
        config: RefCell::new(LoopbackRemote::config()),
        parameters: AuthParameters::default(),
        local_volume: root.join("volume"),
        pulled_volume: root.join("pulled"),
        fetched: RefCell::new(None),
        listing: RefCell::new(Vec::new()),
        progress: RefCell::new(Vec::new()),
        error: RefCell::new(None),
        _workspace: workspace,
    }
}
