//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::bootstrap::{
    BootstrapConfig, BootstrapError, BootstrapSettings, Bootstrapper, CommandOutput,
    CommandRunner, DEFAULT_INITIAL_SLEEP_DELAY_SECS, DEFAULT_SSH_PORT,
    DEFAULT_VALIDATION_CLIENT_NAME, DEFAULT_VALIDATION_KEY,
};
use crate::config::{DEFAULT_REGION, EucaConfig};
use crate::probe::{Connector, ProbeFuture, ProbeStream};
use crate::provision::{
    Provider, ProviderError, ProviderFuture, RUNNING_STATE, ServerInstance, ServerRequest,
};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns a Eucalyptus configuration that passes validation.
#[must_use]
pub fn euca_config() -> EucaConfig {
    EucaConfig {
        access_key_id: String::from("AKIDEXAMPLE"),
        secret_access_key: String::from("secret"),
        api_endpoint: String::from("http://cloud.example.test:8773/services/Eucalyptus"),
        region: DEFAULT_REGION.to_owned(),
        image: None,
        flavor: None,
        availability_zone: None,
        ssh_key_id: None,
    }
}

/// Returns bootstrap settings that pass validation.
#[must_use]
pub fn bootstrap_settings() -> BootstrapSettings {
    BootstrapSettings {
        ssh_bin: String::from("ssh"),
        sshpass_bin: String::from("sshpass"),
        ssh_port: DEFAULT_SSH_PORT,
        initial_sleep_delay_secs: DEFAULT_INITIAL_SLEEP_DELAY_SECS,
        chef_server_url: String::from("https://chef.example.test"),
        validation_client_name: DEFAULT_VALIDATION_CLIENT_NAME.to_owned(),
        validation_key: DEFAULT_VALIDATION_KEY.to_owned(),
        distro: None,
        bootstrap_version: None,
        template_file: None,
    }
}

/// Returns the server the scripted provider launches unless told otherwise.
#[must_use]
pub fn sample_server() -> ServerInstance {
    ServerInstance {
        id: String::from("i-4B2A07E1"),
        flavor_id: Some(String::from("m1.small")),
        image_id: Some(String::from("emi-1A2B3C4D")),
        availability_zone: Some(String::from("cluster01")),
        groups: vec![String::from("default")],
        key_name: Some(String::from("ops")),
        dns_name: Some(String::from("10.0.0.5")),
        private_dns_name: Some(String::from("172.16.0.5")),
        public_ip_address: Some(String::from("10.0.0.5")),
        private_ip_address: Some(String::from("172.16.0.5")),
        state: String::from("pending"),
    }
}

/// Outcome of one scripted [`Provider::reload`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReloadScript {
    /// The server is still booting.
    Pending,
    /// The server reports running.
    Ready,
    /// The cloud answers with HTTP 403.
    Forbidden,
    /// The cloud does not list the instance yet.
    NotFound,
    /// The cloud fails with a non-transient error.
    Fail(String),
}

/// Errors produced by [`ScriptedProvider`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedProviderError {
    /// Simulated HTTP 403.
    #[error("forbidden")]
    Forbidden,
    /// Simulated reload of an instance the cloud does not list yet.
    #[error("instance not found")]
    NotFound,
    /// Simulated fatal provider failure.
    #[error("scripted failure: {0}")]
    Failure(String),
    /// Raised when a test did not queue enough reload outcomes.
    #[error("no scripted reload available")]
    Exhausted,
}

impl ProviderError for ScriptedProviderError {
    fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    server: ServerInstance,
    create_failure: Option<String>,
    reloads: VecDeque<ReloadScript>,
    requests: Vec<ServerRequest>,
    reload_calls: usize,
}

/// Provider double that launches a fixed server and replays scripted reload
/// outcomes in FIFO order.
#[derive(Clone, Debug)]
pub struct ScriptedProvider {
    state: Arc<StdMutex<ProviderState>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Creates a provider that launches [`sample_server`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_server(sample_server())
    }

    /// Creates a provider that launches `server`.
    #[must_use]
    pub fn with_server(server: ServerInstance) -> Self {
        Self {
            state: Arc::new(StdMutex::new(ProviderState {
                server,
                ..ProviderState::default()
            })),
        }
    }

    /// Makes the next `create` call fail with `message`.
    pub fn fail_create(&self, message: impl Into<String>) {
        lock(&self.state).create_failure = Some(message.into());
    }

    /// Queues the outcome of a reload.
    pub fn push_reload(&self, script: ReloadScript) {
        lock(&self.state).reloads.push_back(script);
    }

    /// Returns every request passed to `create`.
    #[must_use]
    pub fn requests(&self) -> Vec<ServerRequest> {
        lock(&self.state).requests.clone()
    }

    /// Returns the number of reload calls made so far.
    #[must_use]
    pub fn reload_calls(&self) -> usize {
        lock(&self.state).reload_calls
    }
}

impl Provider for ScriptedProvider {
    type Error = ScriptedProviderError;

    fn create<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            match state.create_failure.take() {
                Some(message) => Err(ScriptedProviderError::Failure(message)),
                None => Ok(state.server.clone()),
            }
        })
    }

    fn reload<'a>(
        &'a self,
        server: &'a ServerInstance,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.reload_calls += 1;
            let script = state
                .reloads
                .pop_front()
                .ok_or(ScriptedProviderError::Exhausted)?;
            let mut snapshot = server.clone();
            match script {
                ReloadScript::Pending => snapshot.state = String::from("pending"),
                ReloadScript::Ready => snapshot.state = RUNNING_STATE.to_owned(),
                ReloadScript::Forbidden => return Err(ScriptedProviderError::Forbidden),
                ReloadScript::NotFound => return Err(ScriptedProviderError::NotFound),
                ReloadScript::Fail(message) => {
                    return Err(ScriptedProviderError::Failure(message));
                }
            }
            Ok(snapshot)
        })
    }
}

/// Bootstrapper double that replays scripted results and records every
/// configuration it receives.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBootstrapper {
    results: Arc<StdMutex<VecDeque<Result<(), BootstrapError>>>>,
    calls: Arc<StdMutex<Vec<BootstrapConfig>>>,
}

impl ScriptedBootstrapper {
    /// Creates a bootstrapper with no queued results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful bootstrap.
    pub fn push_success(&self) {
        lock(&self.results).push_back(Ok(()));
    }

    /// Queues a connection refused failure.
    pub fn push_refused(&self) {
        lock(&self.results).push_back(Err(BootstrapError::ConnectionRefused {
            host: String::from("scripted"),
        }));
    }

    /// Queues an arbitrary failure.
    pub fn push_error(&self, err: BootstrapError) {
        lock(&self.results).push_back(Err(err));
    }

    /// Returns every configuration passed to `bootstrap`.
    #[must_use]
    pub fn calls(&self) -> Vec<BootstrapConfig> {
        lock(&self.calls).clone()
    }
}

impl Bootstrapper for ScriptedBootstrapper {
    fn bootstrap(&self, config: &BootstrapConfig) -> Result<(), BootstrapError> {
        lock(&self.calls).push(config.clone());
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| {
                Err(BootstrapError::Spawn {
                    program: String::from("bootstrap"),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: std::rc::Rc<std::cell::RefCell<VecDeque<CommandOutput>>>,
    invocations: std::rc::Rc<std::cell::RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Variables added to the child environment.
    pub envs: Vec<(OsString, OsString)>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        envs: &[(OsString, OsString)],
    ) -> Result<CommandOutput, BootstrapError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            envs: envs.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| BootstrapError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Behaviour of one scripted probe connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProbeScript {
    /// Connecting fails with the given error kind.
    ConnectError(io::ErrorKind),
    /// The server answers immediately with the banner.
    Banner(String),
    /// The server accepts the connection but never speaks.
    Silent,
    /// The connection fails with the given kind while waiting to read.
    ReadError(io::ErrorKind),
}

/// Probe connector double that replays scripted connections and counts how
/// many streams were released.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    scripts: Arc<StdMutex<VecDeque<ProbeScript>>>,
    connects: Arc<StdMutex<Vec<(String, u16)>>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    /// Creates a connector with no queued connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the behaviour of the next connection.
    pub fn push(&self, script: ProbeScript) {
        lock(&self.scripts).push_back(script);
    }

    /// Returns every host and port passed to `connect`.
    #[must_use]
    pub fn connects(&self) -> Vec<(String, u16)> {
        lock(&self.connects).clone()
    }

    /// Returns the number of streams dropped so far.
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Stream handed out by [`ScriptedConnector`].
#[derive(Debug)]
pub struct ScriptedStream {
    script: ProbeScript,
    released: Arc<AtomicUsize>,
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, Self::Stream> {
        Box::pin(async move {
            lock(&self.connects).push((host.to_owned(), port));
            let script = lock(&self.scripts).pop_front().ok_or_else(|| {
                io::Error::new(io::ErrorKind::Unsupported, "no scripted connection")
            })?;
            if let ProbeScript::ConnectError(kind) = script {
                return Err(io::Error::from(kind));
            }
            Ok(ScriptedStream {
                script,
                released: Arc::clone(&self.released),
            })
        })
    }
}

impl ProbeStream for ScriptedStream {
    fn readable(&mut self) -> ProbeFuture<'_, ()> {
        Box::pin(async move {
            match &self.script {
                ProbeScript::Silent => std::future::pending().await,
                ProbeScript::ReadError(kind) => Err(io::Error::from(*kind)),
                ProbeScript::Banner(_) | ProbeScript::ConnectError(_) => Ok(()),
            }
        })
    }

    fn read_banner(&mut self) -> ProbeFuture<'_, String> {
        Box::pin(async move {
            match &self.script {
                ProbeScript::Banner(banner) => Ok(banner.clone()),
                _ => Ok(String::new()),
            }
        })
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    ///
    /// Variables with an empty value are removed for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                if value.is_empty() {
                    env::remove_var(key);
                } else {
                    env::set_var(key, value);
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
