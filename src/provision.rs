//! Provisioning abstraction for Eucalyptus-compatible clouds.
//!
//! The orchestrator talks to the cloud through [`Provider`], which creates a
//! server from a [`ServerRequest`] and reloads [`ServerInstance`] snapshots.
//! Readiness polling lives in [`wait_for_ready`] so every provider shares the
//! same poll-and-report loop.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Interval between readiness polls when a provider does not override it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Provider state reported once an instance has finished booting.
pub const RUNNING_STATE: &str = "running";

/// Parameters required to launch a new server.
///
/// Values are passed through untouched: the provider is responsible for
/// rejecting invalid combinations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Machine image identifier (for example `emi-1A2B3C4D`).
    pub image_id: Option<String>,
    /// Flavor, or instance type, to request (for example `m1.small`).
    pub flavor_id: Option<String>,
    /// Security groups applied to the server, in the order given.
    pub groups: Vec<String>,
    /// Name of the key pair injected into the server.
    pub key_name: Option<String>,
    /// Availability zone to launch in; the cloud picks one when absent.
    pub availability_zone: Option<String>,
}

impl ServerRequest {
    /// Starts a builder for a [`ServerRequest`].
    #[must_use]
    pub fn builder() -> ServerRequestBuilder {
        ServerRequestBuilder::new()
    }
}

/// Builder for [`ServerRequest`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerRequestBuilder {
    image_id: Option<String>,
    flavor_id: Option<String>,
    groups: Vec<String>,
    key_name: Option<String>,
    availability_zone: Option<String>,
}

impl ServerRequestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: Option<String>) -> Self {
        self.image_id = value;
        self
    }

    /// Sets the flavor identifier.
    #[must_use]
    pub fn flavor_id(mut self, value: Option<String>) -> Self {
        self.flavor_id = value;
        self
    }

    /// Sets the security groups.
    #[must_use]
    pub fn groups(mut self, value: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups = value.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the key pair name.
    #[must_use]
    pub fn key_name(mut self, value: Option<String>) -> Self {
        self.key_name = value;
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn availability_zone(mut self, value: Option<String>) -> Self {
        self.availability_zone = value;
        self
    }

    /// Builds the [`ServerRequest`].
    #[must_use]
    pub fn build(self) -> ServerRequest {
        ServerRequest {
            image_id: self.image_id,
            flavor_id: self.flavor_id,
            groups: self.groups,
            key_name: self.key_name,
            availability_zone: self.availability_zone,
        }
    }
}

/// Point-in-time view of a server as reported by the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerInstance {
    /// Provider identifier (for example `i-4B2A07E1`).
    pub id: String,
    /// Flavor the server was launched with.
    pub flavor_id: Option<String>,
    /// Image the server was launched from.
    pub image_id: Option<String>,
    /// Availability zone hosting the server.
    pub availability_zone: Option<String>,
    /// Security group names attached to the server.
    pub groups: Vec<String>,
    /// Key pair injected at launch.
    pub key_name: Option<String>,
    /// Public DNS name, which Eucalyptus often reports as a dotted address.
    pub dns_name: Option<String>,
    /// Private DNS name.
    pub private_dns_name: Option<String>,
    /// Public IPv4 address.
    pub public_ip_address: Option<String>,
    /// Private IPv4 address.
    pub private_ip_address: Option<String>,
    /// Lifecycle state reported by the provider (`pending`, `running`, ...).
    pub state: String,
}

impl ServerInstance {
    /// Returns `true` once the provider reports the server as running.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == RUNNING_STATE
    }

    /// Returns the address used to reach the server over SSH.
    ///
    /// The public DNS name is preferred; the public IP address is used when
    /// the cloud does not assign names.
    #[must_use]
    pub fn ssh_host(&self) -> Option<&str> {
        [self.dns_name.as_deref(), self.public_ip_address.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|host| !host.is_empty())
    }
}

/// Error contract shared by provider implementations.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the cloud refused the call with an authorisation
    /// error that is expected to clear on its own.
    fn is_forbidden(&self) -> bool;

    /// Returns `true` when a reload failed because the cloud has not caught
    /// up with the instance yet (not visible, or unreachable). Readiness
    /// polling treats such failures as "not ready".
    fn is_transient(&self) -> bool;
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud provisioning clients.
pub trait Provider {
    /// Provider specific error type.
    type Error: ProviderError;

    /// Launches a server and returns its initial snapshot.
    fn create<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error>;

    /// Fetches a fresh snapshot of `server`.
    fn reload<'a>(
        &'a self,
        server: &'a ServerInstance,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error>;

    /// Delay between readiness polls.
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

/// Reloads `server` until it reports ready, calling `on_attempt` after every
/// reload.
///
/// There is no deadline. Transient reload failures count as a poll that found
/// the server not ready; the loop ends when the server is ready or the
/// provider returns any other error.
///
/// # Errors
///
/// Propagates the first non-transient error returned by
/// [`Provider::reload`].
pub async fn wait_for_ready<P, F>(
    provider: &P,
    server: &ServerInstance,
    mut on_attempt: F,
) -> Result<ServerInstance, P::Error>
where
    P: Provider + ?Sized,
    F: FnMut(),
{
    loop {
        match provider.reload(server).await {
            Ok(snapshot) if snapshot.is_ready() => {
                on_attempt();
                return Ok(snapshot);
            }
            Ok(_) => on_attempt(),
            Err(err) if err.is_transient() => {
                debug!(instance_id = %server.id, error = %err, "reload failed, still waiting");
                on_attempt();
            }
            Err(err) => return Err(err),
        }
        sleep(provider.poll_interval()).await;
    }
}
