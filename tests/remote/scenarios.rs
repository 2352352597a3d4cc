//! BDD scenarios for commits stored on an SSH remote.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RemoteContext, remote_context};

#[scenario(
    path = "tests/features/remote.feature",
    name = "Metadata written to the remote reads back unchanged"
)]
fn scenario_metadata_round_trip(remote_context: RemoteContext) {
    drop(remote_context);
}

#[scenario(
    path = "tests/features/remote.feature",
    name = "Commits are listed newest first"
)]
fn scenario_listing_order(remote_context: RemoteContext) {
    drop(remote_context);
}

#[scenario(
    path = "tests/features/remote.feature",
    name = "A missing commit reads as absent"
)]
fn scenario_missing_commit(remote_context: RemoteContext) {
    drop(remote_context);
}

#[scenario(
    path = "tests/features/remote.feature",
    name = "Volume data survives a push and a pull"
)]
fn scenario_volume_round_trip(remote_context: RemoteContext) {
    drop(remote_context);
}

#[scenario(
    path = "tests/features/remote.feature",
    name = "Transfers fail cleanly without credentials"
)]
fn scenario_missing_credentials(remote_context: RemoteContext) {
    drop(remote_context);
}
