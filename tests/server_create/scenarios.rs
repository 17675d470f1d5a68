//! BDD scenarios for the server create flow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ServerWorld, server_world};

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Launch, wait for sshd, and bootstrap a node"
)]
fn scenario_happy_path(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Keep polling through forbidden responses"
)]
fn scenario_forbidden_retry(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Retry the bootstrap while sshd refuses connections"
)]
fn scenario_refused_retry(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Stop on a fatal bootstrap error"
)]
fn scenario_fatal_bootstrap(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Report an empty run list"
)]
fn scenario_empty_run_list(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Launch with several security groups"
)]
fn scenario_security_groups(server_world: ServerWorld) {
    drop(server_world);
}

#[scenario(
    path = "tests/features/server_create.feature",
    name = "Keep polling until the cloud lists the new server"
)]
fn scenario_unlisted_server(server_world: ServerWorld) {
    drop(server_world);
}
