//! Shared fixtures for server create BDD scenarios.

use std::cell::RefCell;

use knife_euca::test_support::{
    ScriptedBootstrapper, ScriptedConnector, ScriptedProvider, ScriptedProviderError,
    bootstrap_settings, euca_config,
};
use knife_euca::{
    RunConfig, ServerCreate, ServerCreateError, ServerCreateOptions, ServerInstance, SshProbe,
};
use rstest::fixture;

pub type CreateResult = Result<ServerInstance, ServerCreateError<ScriptedProviderError>>;

/// Finished run: the orchestrator result plus everything written to the
/// report.
#[derive(Debug)]
pub struct Outcome {
    pub result: CreateResult,
    pub output: String,
}

#[derive(Debug, Default)]
pub struct ServerWorld {
    pub provider: ScriptedProvider,
    pub bootstrapper: ScriptedBootstrapper,
    pub connector: ScriptedConnector,
    pub options: RefCell<ServerCreateOptions>,
    pub outcome: RefCell<Option<Outcome>>,
}

impl ServerWorld {
    pub fn run_config(&self) -> Result<RunConfig, String> {
        RunConfig::resolve(
            self.options.borrow().clone(),
            &euca_config(),
            &bootstrap_settings(),
        )
        .map_err(|err| err.to_string())
    }

    pub fn orchestrator(
        &self,
    ) -> ServerCreate<ScriptedProvider, ScriptedBootstrapper, ScriptedConnector> {
        ServerCreate::new(
            self.provider.clone(),
            self.bootstrapper.clone(),
            SshProbe::new(self.connector.clone(), 22),
        )
    }

    /// Runs `check` against the recorded outcome, failing when the when-step
    /// has not run yet.
    pub fn with_outcome<T>(
        &self,
        check: impl FnOnce(&Outcome) -> Result<T, String>,
    ) -> Result<T, String> {
        let outcome = self.outcome.borrow();
        let recorded = outcome
            .as_ref()
            .ok_or_else(|| String::from("server create has not run"))?;
        check(recorded)
    }
}

#[fixture]
pub fn server_world() -> ServerWorld {
    ServerWorld::default()
}
