//! BDD step definitions for the `knife-euca server create` flow.

use knife_euca::Reporter;
use knife_euca::bootstrap::BootstrapError;
use knife_euca::test_support::{ProbeScript, ReloadScript};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::{Outcome, ServerWorld};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("scenario setup failed: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a server create run with run list \"{run_list}\"")]
fn run_with_run_list(server_world: &ServerWorld, run_list: String) {
    server_world.options.borrow_mut().run_list = Some(run_list);
}

#[given("a server create run with an empty run list")]
fn run_with_empty_run_list(server_world: &ServerWorld) {
    server_world.options.borrow_mut().run_list = Some(String::new());
}

#[given("a server create run with groups \"{groups}\"")]
fn run_with_groups(server_world: &ServerWorld, groups: String) {
    server_world.options.borrow_mut().security_groups = Some(groups);
}

#[given("the cloud reports the server running after \"{polls}\" polls")]
fn running_after(server_world: &ServerWorld, polls: usize) {
    for _ in 1..polls {
        server_world.provider.push_reload(ReloadScript::Pending);
    }
    server_world.provider.push_reload(ReloadScript::Ready);
}

#[given("the cloud answers forbidden \"{count}\" times before running")]
fn forbidden_before_running(server_world: &ServerWorld, count: usize) {
    for _ in 0..count {
        server_world.provider.push_reload(ReloadScript::Forbidden);
    }
    server_world.provider.push_reload(ReloadScript::Ready);
}

#[given("the cloud does not list the server for \"{count}\" polls before running")]
fn unlisted_before_running(server_world: &ServerWorld, count: usize) {
    for _ in 0..count {
        server_world.provider.push_reload(ReloadScript::NotFound);
    }
    server_world.provider.push_reload(ReloadScript::Ready);
}

#[given("sshd answers with banner \"{banner}\"")]
fn sshd_answers(server_world: &ServerWorld, banner: String) {
    server_world.connector.push(ProbeScript::Banner(banner));
}

#[given("the bootstrap succeeds")]
fn bootstrap_succeeds(server_world: &ServerWorld) {
    server_world.bootstrapper.push_success();
}

#[given("the bootstrap is refused \"{count}\" times before succeeding")]
fn bootstrap_refused(server_world: &ServerWorld, count: usize) {
    for _ in 0..count {
        server_world.bootstrapper.push_refused();
    }
    server_world.bootstrapper.push_success();
}

#[given("the bootstrap fails with \"{stderr}\"")]
fn bootstrap_fails(server_world: &ServerWorld, stderr: String) {
    server_world
        .bootstrapper
        .push_error(BootstrapError::CommandFailure {
            program: String::from("ssh"),
            status: Some(255),
            status_text: String::from("255"),
            stderr,
        });
}

#[when("I create the server")]
fn create_server(server_world: &ServerWorld) -> Result<(), StepError> {
    let config = server_world.run_config().map_err(StepError::Setup)?;
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Setup(err.to_string()))?;

    let orchestrator = server_world.orchestrator();
    let mut reporter = Reporter::new(Vec::new(), false);
    let result = runtime.block_on(orchestrator.execute(&config, &mut reporter));
    let output = String::from_utf8(reporter.into_inner())
        .map_err(|err| StepError::Setup(err.to_string()))?;

    *server_world.outcome.borrow_mut() = Some(Outcome { result, output });
    Ok(())
}

#[then("the run succeeds")]
fn run_succeeds(server_world: &ServerWorld) -> Result<(), StepError> {
    server_world
        .with_outcome(|outcome| match &outcome.result {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("expected success, got: {err}")),
        })
        .map_err(StepError::Assertion)
}

#[then("the run fails naming instance \"{instance_id}\"")]
fn run_fails(server_world: &ServerWorld, instance_id: String) -> Result<(), StepError> {
    server_world
        .with_outcome(|outcome| match &outcome.result {
            Ok(_) => Err(String::from("expected the run to fail")),
            Err(err) if err.to_string().contains(&instance_id) => Ok(()),
            Err(err) => Err(format!("error should name {instance_id}: {err}")),
        })
        .map_err(StepError::Assertion)
}

#[then("the instance id \"{instance_id}\" is reported twice")]
fn instance_reported_twice(
    server_world: &ServerWorld,
    instance_id: String,
) -> Result<(), StepError> {
    let needle = format!("Instance ID: {instance_id}");
    server_world
        .with_outcome(|outcome| {
            let count = outcome.output.matches(&needle).count();
            if count == 2 {
                Ok(())
            } else {
                Err(format!("expected '{needle}' twice, found {count}"))
            }
        })
        .map_err(StepError::Assertion)
}

#[then("the report shows \"{text}\"")]
fn report_shows(server_world: &ServerWorld, text: String) -> Result<(), StepError> {
    server_world
        .with_outcome(|outcome| {
            if outcome.output.contains(&text) {
                Ok(())
            } else {
                Err(format!("report lacks '{text}':\n{}", outcome.output))
            }
        })
        .map_err(StepError::Assertion)
}

#[then("the report ends with an empty run list")]
fn report_ends_with_empty_run_list(server_world: &ServerWorld) -> Result<(), StepError> {
    server_world
        .with_outcome(|outcome| {
            if outcome.output.ends_with("Run List: \n") {
                Ok(())
            } else {
                Err(format!("unexpected report tail:\n{}", outcome.output))
            }
        })
        .map_err(StepError::Assertion)
}

#[then("the bootstrap ran \"{count}\" times")]
fn bootstrap_ran(server_world: &ServerWorld, count: usize) -> Result<(), StepError> {
    let calls = server_world.bootstrapper.calls().len();
    if calls == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} bootstrap attempts, saw {calls}"
        )))
    }
}

#[then("the launch requested groups \"{groups}\" in order")]
fn launch_requested_groups(server_world: &ServerWorld, groups: String) -> Result<(), StepError> {
    let expected: Vec<&str> = groups.split(',').collect();
    let requests = server_world.provider.requests();
    match requests.as_slice() {
        [request] if request.groups == expected => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected one launch with groups {expected:?}, saw {requests:?}"
        ))),
    }
}
