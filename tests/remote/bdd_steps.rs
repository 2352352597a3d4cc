//! BDD step definitions for commit metadata and volume transfers over SSH.

use std::fs;

use camino::Utf8PathBuf;
use rstest_bdd_macros::{given, then, when};
use serde_json::{Map, Value, json};
use ssh_remote::{
    Commit, RemoteProvider, SyncDirection, SyncOperation, TagMatch, TransferProgress,
};

use super::test_helpers::RemoteContext;
use crate::loopback::BASE_PATH;

fn stamped(timestamp: &str, tag: Option<&str>) -> Commit {
    let mut tags = Map::new();
    if let Some(key) = tag {
        tags.insert(key.to_owned(), Value::Null);
    }
    let mut metadata = Map::new();
    metadata.insert(String::from("timestamp"), json!(timestamp));
    metadata.insert(String::from("tags"), Value::Object(tags));
    metadata.insert(String::from("message"), json!("created by a scenario"));
    Commit::new(metadata)
}

fn operation(
    remote_context: &RemoteContext,
    direction: SyncDirection,
    commit: String,
    volume: String,
    local_path: Utf8PathBuf,
) -> SyncOperation {
    SyncOperation {
        direction,
        remote: remote_context.config.borrow().clone(),
        parameters: remote_context.parameters.clone(),
        commit_id: commit,
        volume,
        local_path,
    }
}

fn transfer(remote_context: &RemoteContext, op: &SyncOperation) {
    let provider = &remote_context.provider;
    let mut samples = Vec::new();
    let result = provider.sync_start(op).and_then(|()| {
        provider.sync_volume(op, &mut |sample: &TransferProgress| samples.push(sample.clone()))
    });
    let result = result.and_then(|()| provider.sync_end(op));
    remote_context.progress.borrow_mut().extend(samples);
    if let Err(err) = result {
        remote_context.error.replace(Some(err));
    }
}

#[given("an empty SSH remote")]
fn empty_remote(remote_context: &RemoteContext) {
    fs::create_dir_all(remote_context.remote.host_path(BASE_PATH))
        .unwrap_or_else(|err| panic!("create base path: {err}"));
}

#[given("commit \"{id}\" stamped \"{timestamp}\" with tag \"{tag}\"")]
fn existing_commit(remote_context: &RemoteContext, id: String, timestamp: String, tag: String) {
    remote_context
        .provider
        .push_metadata(
            &remote_context.config.borrow(),
            &remote_context.parameters,
            &id,
            &stamped(&timestamp, Some(tag.as_str())),
            false,
        )
        .unwrap_or_else(|err| panic!("seed commit {id}: {err}"));
}

#[given("a local volume holding \"{name}\" with \"{contents}\"")]
fn local_volume(remote_context: &RemoteContext, name: String, contents: String) {
    fs::create_dir_all(&remote_context.local_volume)
        .unwrap_or_else(|err| panic!("create local volume: {err}"));
    fs::write(remote_context.local_volume.join(name), contents)
        .unwrap_or_else(|err| panic!("write local volume file: {err}"));
}

#[given("the stored password is removed")]
fn password_removed(remote_context: &RemoteContext) {
    remote_context.config.borrow_mut().password = None;
}

#[when("I push metadata for commit \"{id}\" stamped \"{timestamp}\"")]
fn push_metadata(remote_context: &RemoteContext, id: String, timestamp: String) {
    remote_context
        .provider
        .push_metadata(
            &remote_context.config.borrow(),
            &remote_context.parameters,
            &id,
            &stamped(&timestamp, None),
            false,
        )
        .unwrap_or_else(|err| panic!("push metadata for {id}: {err}"));
}

#[when("I fetch commit \"{id}\"")]
fn fetch_commit(remote_context: &RemoteContext, id: String) {
    let fetched = remote_context
        .provider
        .get_commit(
            &remote_context.config.borrow(),
            &remote_context.parameters,
            &id,
        )
        .unwrap_or_else(|err| panic!("fetch commit {id}: {err}"));
    remote_context.fetched.replace(Some(fetched));
}

#[when("I list commits tagged \"{tag}\"")]
fn list_commits(remote_context: &RemoteContext, tag: String) {
    let commits = remote_context
        .provider
        .list_commits(
            &remote_context.config.borrow(),
            &remote_context.parameters,
            &[TagMatch::key(tag)],
        )
        .unwrap_or_else(|err| panic!("list commits: {err}"));
    remote_context
        .listing
        .replace(commits.into_iter().map(|(id, _)| id).collect());
}

#[when("I push volume \"{volume}\" of commit \"{commit}\"")]
fn push_volume(remote_context: &RemoteContext, volume: String, commit: String) {
    let op = operation(
        remote_context,
        SyncDirection::Push,
        commit,
        volume,
        remote_context.local_volume.clone(),
    );
    transfer(remote_context, &op);
}

#[when("I pull volume \"{volume}\" of commit \"{commit}\" into a fresh directory")]
fn pull_volume(remote_context: &RemoteContext, volume: String, commit: String) {
    let op = operation(
        remote_context,
        SyncDirection::Pull,
        commit,
        volume,
        remote_context.pulled_volume.clone(),
    );
    transfer(remote_context, &op);
}

#[then("commit \"{id}\" reads back stamped \"{timestamp}\"")]
fn commit_reads_back(remote_context: &RemoteContext, id: String, timestamp: String) {
    let commit = remote_context
        .provider
        .get_commit(
            &remote_context.config.borrow(),
            &remote_context.parameters,
            &id,
        )
        .unwrap_or_else(|err| panic!("fetch commit {id}: {err}"));
    assert_eq!(commit, Some(stamped(&timestamp, None)));
}

#[then("the listing is \"{expected}\"")]
fn listing_is(remote_context: &RemoteContext, expected: String) {
    let listing = remote_context.listing.borrow().join(",");
    assert_eq!(listing, expected);
}

#[then("no commit is returned")]
fn no_commit(remote_context: &RemoteContext) {
    assert_eq!(*remote_context.fetched.borrow(), Some(None));
}

#[then("the pulled volume holds \"{name}\" with \"{contents}\"")]
fn pulled_volume_holds(remote_context: &RemoteContext, name: String, contents: String) {
    assert!(
        remote_context.error.borrow().is_none(),
        "transfer failed: {:?}",
        remote_context.error.borrow()
    );
    let path = remote_context.pulled_volume.join(&name);
    let actual = fs::read_to_string(&path).unwrap_or_else(|err| panic!("read {path}: {err}"));
    assert_eq!(actual, contents);
}

#[then("transfer progress was reported")]
fn progress_reported(remote_context: &RemoteContext) {
    let progress = remote_context.progress.borrow();
    assert_eq!(progress.len(), 2, "one sample per transfer: {progress:?}");
    assert!(progress.iter().all(|sample| sample.percent == 100));
}

#[then("no credential file remains")]
fn credentials_removed(remote_context: &RemoteContext) {
    let seen = remote_context.remote.credentials_seen();
    assert!(!seen.is_empty(), "transfers should reference credentials");
    for path in seen {
        assert!(!path.exists(), "credential {path} should be deleted");
    }
}

#[then("the transfer fails with a configuration error")]
fn transfer_fails(remote_context: &RemoteContext) {
    let error = remote_context.error.borrow();
    let Some(err) = error.as_ref() else {
        panic!("transfer should have failed");
    };
    assert!(err.is_configuration_error(), "unexpected error: {err}");
}
