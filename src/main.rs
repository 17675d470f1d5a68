//! Binary entry point for the `knife-euca` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use knife_euca::{
    BootstrapSettings, EucaConfig, EucaError, EucaProvider, Reporter, RunConfig, ServerCreate,
    ServerCreateError, ServerCreateOptions, SshBootstrapper, SshProbe, StreamingCommandRunner,
    TcpConnector,
};

mod cli;

use cli::{Cli, ServerCommand, ServerCreateCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid option: {0}")]
    Settings(String),
    #[error("provider error: {0}")]
    Provider(#[from] EucaError),
    #[error("bootstrap error: {0}")]
    Bootstrap(String),
    #[error("server create failed: {0}")]
    ServerCreate(#[from] ServerCreateError<EucaError>),
}

impl From<ServerCreateCommand> for ServerCreateOptions {
    fn from(command: ServerCreateCommand) -> Self {
        Self {
            flavor: command.flavor,
            image: command.image,
            security_groups: command.security_groups,
            availability_zone: command.availability_zone,
            chef_node_name: command.chef_node_name,
            ssh_key_name: command.ssh_key_name,
            ssh_user: command.ssh_user,
            ssh_password: command.ssh_password,
            identity_file: command.identity_file,
            prerelease: command.prerelease,
            bootstrap_version: command.bootstrap_version,
            distro: command.distro,
            template_file: command.template_file,
            run_list: command.run_list,
            no_host_key_verify: command.no_host_key_verify,
            environment: command.environment,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();
}

/// Builds the diagnostics filter from `RUST_LOG`, falling back to `warn`.
fn log_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Server(ServerCommand::Create(command)) => server_create(command.into()).await,
    }
}

async fn server_create(options: ServerCreateOptions) -> Result<(), CliError> {
    let euca_config =
        EucaConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let bootstrap_settings = BootstrapSettings::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let run_config = resolve_options(options, &euca_config, &bootstrap_settings)?;

    let provider = EucaProvider::new(&euca_config)?;
    let probe = SshProbe::new(TcpConnector, bootstrap_settings.ssh_port);
    let initial_sleep_delay = bootstrap_settings.initial_sleep_delay();
    let bootstrapper = SshBootstrapper::new(bootstrap_settings, StreamingCommandRunner)
        .map_err(|err| CliError::Bootstrap(err.to_string()))?;

    let orchestrator = ServerCreate::new(provider, bootstrapper, probe)
        .with_initial_sleep_delay(initial_sleep_delay);
    let mut reporter = Reporter::stdout();
    orchestrator.execute(&run_config, &mut reporter).await?;
    Ok(())
}

fn resolve_options(
    options: ServerCreateOptions,
    euca_config: &EucaConfig,
    bootstrap_settings: &BootstrapSettings,
) -> Result<RunConfig, CliError> {
    RunConfig::resolve(options, euca_config, bootstrap_settings)
        .map_err(|err| CliError::Settings(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
