//! Orchestrates `server create`: launch, wait, probe sshd, bootstrap, report.
//!
//! Every wait in the flow is an unbounded retry loop gated on one kind of
//! transient failure. Nothing is torn down on a fatal error, so errors raised
//! after the launch name the instance that was left running.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bootstrap::{BootstrapConfig, BootstrapError, Bootstrapper};
use crate::probe::{Connector, SshProbe};
use crate::provision::{Provider, ProviderError, ServerInstance, wait_for_ready};
use crate::report::Reporter;
use crate::settings::RunConfig;

const INITIAL_SLEEP_DELAY: Duration = Duration::from_secs(20);
const FORBIDDEN_BACKOFF: Duration = Duration::from_secs(1);
const REFUSED_BACKOFF: Duration = Duration::from_secs(2);

/// Errors surfaced while creating and bootstrapping a server.
#[derive(Debug, Error)]
pub enum ServerCreateError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the launch request fails.
    #[error("failed to create instance: {0}")]
    Provision(#[source] E),
    /// Raised when polling for readiness fails with a non-transient error.
    #[error("instance {instance_id} did not become ready (left running): {source}")]
    Wait {
        /// Provider instance identifier.
        instance_id: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised when the running instance reports no public address.
    #[error("instance {instance_id} has no public address (left running)")]
    MissingAddress {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the sshd probe fails with an unexpected I/O error.
    #[error("ssh probe of {host} failed for instance {instance_id} (left running): {source}")]
    Probe {
        /// Provider instance identifier.
        instance_id: String,
        /// Address that was probed.
        host: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when the bootstrap fails with anything but a refused
    /// connection.
    #[error("bootstrap of instance {instance_id} failed (left running): {source}")]
    Bootstrap {
        /// Provider instance identifier.
        instance_id: String,
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Raised when report output cannot be written.
    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),
}

/// Executes the `server create` flow with the given collaborators.
#[derive(Debug)]
pub struct ServerCreate<P, B, C> {
    provider: P,
    bootstrapper: B,
    probe: SshProbe<C>,
    initial_sleep_delay: Duration,
    forbidden_backoff: Duration,
    refused_backoff: Duration,
}

impl<P, B, C> ServerCreate<P, B, C>
where
    P: Provider,
    B: Bootstrapper,
    C: Connector,
{
    /// Creates an orchestrator with the default delays.
    #[must_use]
    pub const fn new(provider: P, bootstrapper: B, probe: SshProbe<C>) -> Self {
        Self {
            provider,
            bootstrapper,
            probe,
            initial_sleep_delay: INITIAL_SLEEP_DELAY,
            forbidden_backoff: FORBIDDEN_BACKOFF,
            refused_backoff: REFUSED_BACKOFF,
        }
    }

    /// Overrides the pause taken once sshd first answers.
    #[must_use]
    pub const fn with_initial_sleep_delay(mut self, delay: Duration) -> Self {
        self.initial_sleep_delay = delay;
        self
    }

    /// Overrides the pause after a forbidden readiness poll.
    #[must_use]
    pub const fn with_forbidden_backoff(mut self, backoff: Duration) -> Self {
        self.forbidden_backoff = backoff;
        self
    }

    /// Overrides the pause after a refused bootstrap connection.
    #[must_use]
    pub const fn with_refused_backoff(mut self, backoff: Duration) -> Self {
        self.refused_backoff = backoff;
        self
    }

    /// Launches a server, waits until it accepts SSH, bootstraps it, and
    /// reports its details.
    ///
    /// Returns the last snapshot of the bootstrapped server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerCreateError`] when a step fails with a non-transient
    /// error. The instance is not destroyed.
    pub async fn execute<W: Write>(
        &self,
        config: &RunConfig,
        reporter: &mut Reporter<W>,
    ) -> Result<ServerInstance, ServerCreateError<P::Error>> {
        let request = config.server_request();
        let created = self
            .provider
            .create(&request)
            .await
            .map_err(ServerCreateError::Provision)?;
        info!(instance_id = %created.id, "instance created");
        reporter
            .server_created(&created)
            .map_err(ServerCreateError::Report)?;

        let server = self.wait_until_ready(&created, reporter).await?;
        reporter
            .server_ready(&server)
            .map_err(ServerCreateError::Report)?;

        let host = server
            .ssh_host()
            .ok_or_else(|| ServerCreateError::MissingAddress {
                instance_id: server.id.clone(),
            })?
            .to_owned();

        self.wait_for_sshd(&server, &host, reporter).await?;
        self.bootstrap(config, &server, &host).await?;

        reporter
            .bootstrap_complete(&server, config)
            .map_err(ServerCreateError::Report)?;
        Ok(server)
    }

    async fn wait_until_ready<W: Write>(
        &self,
        created: &ServerInstance,
        reporter: &mut Reporter<W>,
    ) -> Result<ServerInstance, ServerCreateError<P::Error>> {
        reporter
            .waiting_for_server()
            .map_err(ServerCreateError::Report)?;

        loop {
            // Progress dots are best effort.
            let attempt = wait_for_ready(&self.provider, created, || {
                reporter.progress().ok();
            })
            .await;

            match attempt {
                Ok(server) => return Ok(server),
                Err(err) if err.is_forbidden() => {
                    debug!(instance_id = %created.id, error = %err, "readiness poll forbidden");
                    reporter.forbidden().map_err(ServerCreateError::Report)?;
                    sleep(self.forbidden_backoff).await;
                }
                Err(source) => {
                    return Err(ServerCreateError::Wait {
                        instance_id: created.id.clone(),
                        source,
                    });
                }
            }
        }
    }

    async fn wait_for_sshd<W: Write>(
        &self,
        server: &ServerInstance,
        host: &str,
        reporter: &mut Reporter<W>,
    ) -> Result<(), ServerCreateError<P::Error>> {
        reporter
            .waiting_for_sshd()
            .map_err(ServerCreateError::Report)?;

        loop {
            let delay = self.initial_sleep_delay;
            let out = &mut *reporter;
            let ready = self
                .probe
                .tcp_test_ssh(host, move |_banner| async move {
                    sleep(delay).await;
                    out.sshd_ready()
                })
                .await
                .map_err(|source| ServerCreateError::Probe {
                    instance_id: server.id.clone(),
                    host: host.to_owned(),
                    source,
                })?;

            if ready {
                return Ok(());
            }
            reporter.progress().map_err(ServerCreateError::Report)?;
        }
    }

    async fn bootstrap(
        &self,
        config: &RunConfig,
        server: &ServerInstance,
        host: &str,
    ) -> Result<(), ServerCreateError<P::Error>> {
        loop {
            let node = BootstrapConfig::for_server(config, server, host);
            match self.bootstrapper.bootstrap(&node) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_connection_refused() => {
                    warn!(%host, "bootstrap connection refused, retrying");
                    sleep(self.refused_backoff).await;
                }
                Err(source) => {
                    return Err(ServerCreateError::Bootstrap {
                        instance_id: server.id.clone(),
                        source,
                    });
                }
            }
        }
    }
}
