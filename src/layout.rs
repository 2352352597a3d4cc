//! Remote directory layout shared by metadata and volume transfers.
//!
//! ```text
//! <base>/<commit>/metadata.json
//! <base>/<commit>/data/<volume>/
//! ```

use crate::config::RemoteConfig;

/// Name of the per-commit metadata document.
pub const METADATA_FILE: &str = "metadata.json";

/// Directory holding everything belonging to one commit.
#[must_use]
pub fn commit_dir(base: &str, commit_id: &str) -> String {
    format!("{base}/{commit_id}")
}

/// Location of a commit's metadata document.
#[must_use]
pub fn metadata_path(base: &str, commit_id: &str) -> String {
    format!("{base}/{commit_id}/{METADATA_FILE}")
}

/// Root directory of one volume's data within a commit.
#[must_use]
pub fn volume_dir(base: &str, commit_id: &str, volume: &str) -> String {
    format!("{base}/{commit_id}/data/{volume}")
}

/// The `user@host:dir/` endpoint rsync uses for a remote directory.
#[must_use]
pub fn rsync_endpoint(config: &RemoteConfig, remote_dir: &str) -> String {
    format!("{}:{remote_dir}/", config.login())
}
