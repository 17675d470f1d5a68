//! Core library for the `knife-euca` server provisioning tool.
//!
//! The crate launches a server on a Eucalyptus (EC2-compatible) cloud, waits
//! until the cloud reports it running and sshd answers, then bootstraps it
//! with Chef over the system SSH client (create → wait → probe → bootstrap →
//! report).

pub mod bootstrap;
pub mod config;
pub mod euca;
pub mod probe;
pub mod provision;
pub mod report;
pub mod server_create;
pub mod settings;
pub mod test_support;

pub use bootstrap::{
    BootstrapConfig, BootstrapError, BootstrapSettings, Bootstrapper, CommandOutput,
    CommandRunner, SshBootstrapper, StreamingCommandRunner,
};
pub use config::{ConfigError, EucaConfig};
pub use euca::{EucaError, EucaProvider};
pub use probe::{Connector, ProbeStream, SshProbe, TcpConnector};
pub use provision::{
    Provider, ProviderError, ServerInstance, ServerRequest, ServerRequestBuilder, wait_for_ready,
};
pub use report::Reporter;
pub use server_create::{ServerCreate, ServerCreateError};
pub use settings::{RunConfig, ServerCreateOptions, SettingsError};
