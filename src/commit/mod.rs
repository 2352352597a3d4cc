//! Commit metadata stored beside each commit's volumes on the remote.
//!
//! A commit is an opaque directory name plus a JSON document. The store
//! reads and writes that document over SSH and lists commits by scanning the
//! base directory, fetching one document per entry.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{AuthParameters, RemoteConfig};
use crate::error::RemoteError;
use crate::layout::metadata_path;
use crate::process::CommandRunner;
use crate::remote::RemoteExecutor;

/// Metadata document of a single commit.
///
/// Only `timestamp` and `tags` are interpreted; every other field is carried
/// through untouched.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Commit {
    metadata: Map<String, Value>,
}

impl Commit {
    /// Wraps a metadata mapping.
    #[must_use]
    pub const fn new(metadata: Map<String, Value>) -> Self {
        Self { metadata }
    }

    /// Borrows the raw metadata mapping.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Consumes the commit, returning the raw metadata mapping.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.metadata
    }

    /// The `timestamp` field, if it is a string.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.metadata.get("timestamp").and_then(Value::as_str)
    }

    /// The `timestamp` field parsed as RFC 3339.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
    }

    /// The `tags` mapping, if present.
    #[must_use]
    pub fn tags(&self) -> Option<&Map<String, Value>> {
        self.metadata.get("tags").and_then(Value::as_object)
    }

    /// Returns `true` when every filter term matches this commit's tags.
    #[must_use]
    pub fn matches_tags(&self, filter: &[TagMatch]) -> bool {
        if filter.is_empty() {
            return true;
        }
        let Some(tags) = self.tags() else {
            return false;
        };
        filter.iter().all(|term| term.matches(tags))
    }
}

impl From<Map<String, Value>> for Commit {
    fn from(metadata: Map<String, Value>) -> Self {
        Self::new(metadata)
    }
}

/// One tag filter term: the key must exist and, when a value is given, the
/// tag must carry exactly that value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagMatch {
    /// Tag key that must be present.
    pub key: String,
    /// Required value, or `None` to accept any value.
    pub value: Option<String>,
}

impl TagMatch {
    /// Matches any commit carrying `key`.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Matches commits whose `key` tag equals `value`.
    #[must_use]
    pub fn key_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    fn matches(&self, tags: &Map<String, Value>) -> bool {
        let Some(actual) = tags.get(&self.key) else {
            return false;
        };
        match (&self.value, actual) {
            (None, _) => true,
            (Some(_), Value::Null) => false,
            (Some(expected), Value::String(text)) => expected == text,
            (Some(expected), other) => *expected == other.to_string(),
        }
    }
}

impl FromStr for TagMatch {
    type Err = RemoteError;

    /// Parses `key` or `key=value`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (key, value) = match text.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (text, None),
        };
        if key.is_empty() {
            return Err(RemoteError::invalid(format!(
                "tag filter '{text}' has an empty key"
            )));
        }
        Ok(Self {
            key: key.to_owned(),
            value: value.map(str::to_owned),
        })
    }
}

/// Reads, lists, and writes commit metadata on an SSH remote.
#[derive(Clone, Debug)]
pub struct CommitStore<R: CommandRunner> {
    executor: RemoteExecutor<R>,
}

impl<R: CommandRunner> CommitStore<R> {
    /// Creates a store issuing commands through `executor`.
    #[must_use]
    pub const fn new(executor: RemoteExecutor<R>) -> Self {
        Self { executor }
    }

    /// Returns the executor backing this store.
    #[must_use]
    pub const fn executor(&self) -> &RemoteExecutor<R> {
        &self.executor
    }

    /// Fetches a commit's metadata, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Parse`] when the document is not a JSON object
    /// and propagates every remote failure other than a missing path.
    pub fn get_commit(
        &self,
        config: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
    ) -> Result<Option<Commit>, RemoteError> {
        let path = metadata_path(&config.path, commit_id);
        let stdout = match self.executor.run(config, parameters, &["cat", path.as_str()]) {
            Ok(stdout) => stdout,
            Err(RemoteError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        serde_json::from_str::<Map<String, Value>>(&stdout)
            .map(|metadata| Some(Commit::new(metadata)))
            .map_err(|err| RemoteError::Parse {
                resource: path,
                message: err.to_string(),
            })
    }

    /// Lists commits matching `tags`, newest first.
    ///
    /// Metadata is fetched one commit at a time. Directories whose metadata
    /// is missing are skipped. Commits without an RFC 3339 timestamp sort
    /// after all others.
    ///
    /// # Errors
    ///
    /// Propagates failures of the directory listing and of any metadata
    /// fetch other than a missing document.
    pub fn list_commits(
        &self,
        config: &RemoteConfig,
        parameters: &AuthParameters,
        tags: &[TagMatch],
    ) -> Result<Vec<(String, Commit)>, RemoteError> {
        let listing = self
            .executor
            .run(config, parameters, &["ls", "-1", config.path.as_str()])?;

        let mut commits = Vec::new();
        for commit_id in listing.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let Some(commit) = self.get_commit(config, parameters, commit_id)? else {
                debug!(commit_id, "skipping commit without metadata");
                continue;
            };
            if commit.matches_tags(tags) {
                commits.push((commit_id.to_owned(), commit));
            }
        }

        commits.sort_by_cached_key(|(_, commit)| std::cmp::Reverse(commit.parsed_timestamp()));
        Ok(commits)
    }

    /// Writes `commit` as the metadata document of `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Serialize`] when encoding fails and propagates
    /// failures of [`RemoteExecutor::write`].
    pub fn put_metadata(
        &self,
        config: &RemoteConfig,
        parameters: &AuthParameters,
        commit_id: &str,
        commit: &Commit,
    ) -> Result<(), RemoteError> {
        let document = serde_json::to_string(commit).map_err(|err| RemoteError::Serialize {
            commit_id: commit_id.to_owned(),
            message: err.to_string(),
        })?;
        let path = metadata_path(&config.path, commit_id);
        self.executor.write(config, parameters, &path, &document)
    }
}
