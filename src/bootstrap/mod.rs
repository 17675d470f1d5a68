//! Chef bootstrap over the system SSH client.
//!
//! A [`Bootstrapper`] receives a [`BootstrapConfig`] describing the reachable
//! server and performs the remote install. [`SshBootstrapper`] renders a
//! bootstrap script from a distro template, wraps it in `bash -c`, and runs it
//! through `ssh` (or `sshpass -e ssh` for password logins).

use std::ffi::OsString;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use tracing::info;

use crate::provision::ServerInstance;
use crate::settings::{DEFAULT_SSH_USER, RunConfig};

mod config;
mod error;
mod runner;
mod templates;
mod util;

pub use config::{
    BootstrapSettings, DEFAULT_INITIAL_SLEEP_DELAY_SECS, DEFAULT_SSH_PORT,
    DEFAULT_VALIDATION_CLIENT_NAME, DEFAULT_VALIDATION_KEY,
};
pub use error::BootstrapError;
pub use runner::{CommandOutput, CommandRunner, StreamingCommandRunner};
pub use templates::{BUILTIN_DISTROS, DEFAULT_DISTRO, TemplateContext, TemplateRenderer};
pub use util::expand_tilde;

/// Exit status the OpenSSH client uses for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Everything the bootstrap delegate needs to know about one node.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the independent bootstrap toggles exposed on the command line"
)]
pub struct BootstrapConfig {
    /// Address the SSH client connects to.
    pub host: String,
    /// Roles and recipes applied on first boot.
    pub run_list: Vec<String>,
    /// Remote user to log in as.
    pub ssh_user: String,
    /// Password for the remote user, when key authentication is not used.
    pub ssh_password: Option<String>,
    /// Private key used for authentication.
    pub identity_file: Option<String>,
    /// Node name registered with the Chef server.
    pub chef_node_name: String,
    /// Whether to install pre-release Chef gems.
    pub prerelease: bool,
    /// Chef version to install.
    pub bootstrap_version: Option<String>,
    /// Built-in distro template name.
    pub distro: String,
    /// Whether the script runs through `sudo`.
    pub use_sudo: bool,
    /// Custom template that replaces the distro template.
    pub template_file: Option<String>,
    /// Chef environment for the node.
    pub environment: Option<String>,
    /// Whether to skip host key verification.
    pub no_host_key_verify: bool,
}

impl BootstrapConfig {
    /// Projects the run configuration onto a freshly reachable server.
    ///
    /// The node name falls back to the instance id, and `sudo` is used for
    /// every user except `root`.
    #[must_use]
    pub fn for_server(config: &RunConfig, server: &ServerInstance, host: &str) -> Self {
        Self {
            host: host.to_owned(),
            run_list: config.run_list.clone(),
            ssh_user: config.ssh_user.clone(),
            ssh_password: config.ssh_password.clone(),
            identity_file: config.identity_file.clone(),
            chef_node_name: config
                .chef_node_name
                .clone()
                .unwrap_or_else(|| server.id.clone()),
            prerelease: config.prerelease,
            bootstrap_version: config.bootstrap_version.clone(),
            distro: config.distro.clone(),
            use_sudo: config.ssh_user != DEFAULT_SSH_USER,
            template_file: config.template_file.clone(),
            environment: config.environment.clone(),
            no_host_key_verify: config.no_host_key_verify,
        }
    }
}

/// Remote configuration bootstrap performed once a server accepts SSH.
pub trait Bootstrapper {
    /// Runs the bootstrap described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ConnectionRefused`] when the SSH port is not
    /// yet accepting connections; any other variant is fatal.
    fn bootstrap(&self, config: &BootstrapConfig) -> Result<(), BootstrapError>;
}

/// Program, arguments, and extra environment for one SSH invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshInvocation {
    /// Program to execute (`ssh` or `sshpass`).
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Variables added to the child environment.
    pub envs: Vec<(OsString, OsString)>,
}

/// Bootstraps nodes by piping a rendered script through the system SSH
/// client.
#[derive(Debug)]
pub struct SshBootstrapper<R: CommandRunner> {
    settings: BootstrapSettings,
    runner: R,
    templates: TemplateRenderer,
}

impl<R: CommandRunner> SshBootstrapper<R> {
    /// Creates a bootstrapper after validating `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidSettings`] when a required setting is
    /// empty, or [`BootstrapError::Render`] if a built-in template fails to
    /// compile.
    pub fn new(settings: BootstrapSettings, runner: R) -> Result<Self, BootstrapError> {
        settings.validate()?;
        Ok(Self {
            settings,
            runner,
            templates: TemplateRenderer::new()?,
        })
    }

    /// Returns the validated settings.
    #[must_use]
    pub const fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    /// Renders the bootstrap script for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Read`] when the validation key or template
    /// file cannot be read, and the renderer's errors otherwise.
    pub fn render_script(&self, config: &BootstrapConfig) -> Result<String, BootstrapError> {
        let key_path = expand_tilde(&self.settings.validation_key);
        let validation_key =
            std::fs::read_to_string(&key_path).map_err(|err| BootstrapError::Read {
                path: key_path.clone(),
                message: err.to_string(),
            })?;
        let first_boot = serde_json::json!({ "run_list": config.run_list }).to_string();

        let context = TemplateContext {
            chef_server_url: &self.settings.chef_server_url,
            validation_client_name: &self.settings.validation_client_name,
            validation_key: &validation_key,
            node_name: &config.chef_node_name,
            environment: config.environment.as_deref(),
            bootstrap_version: config.bootstrap_version.as_deref(),
            prerelease: config.prerelease,
            first_boot,
        };

        match config.template_file.as_deref() {
            Some(path) => self
                .templates
                .render_file(&Utf8PathBuf::from(expand_tilde(path)), &context),
            None => self.templates.render_distro(&config.distro, &context),
        }
    }

    /// Builds the SSH invocation that runs `remote_command` on the node.
    #[must_use]
    pub fn invocation(&self, config: &BootstrapConfig, remote_command: &str) -> SshInvocation {
        let mut ssh_args = vec![
            OsString::from("-p"),
            OsString::from(self.settings.ssh_port.to_string()),
        ];

        if let Some(identity_file) = config.identity_file.as_deref() {
            ssh_args.push(OsString::from("-i"));
            ssh_args.push(OsString::from(expand_tilde(identity_file)));
        }

        if config.ssh_password.is_none() {
            ssh_args.push(OsString::from("-o"));
            ssh_args.push(OsString::from("BatchMode=yes"));
        }

        if config.no_host_key_verify {
            ssh_args.push(OsString::from("-o"));
            ssh_args.push(OsString::from("StrictHostKeyChecking=no"));
            ssh_args.push(OsString::from("-o"));
            ssh_args.push(OsString::from("UserKnownHostsFile=/dev/null"));
        }

        ssh_args.push(OsString::from(format!("{}@{}", config.ssh_user, config.host)));
        ssh_args.push(OsString::from(remote_command));

        match config.ssh_password.as_deref() {
            Some(password) => {
                let mut args = vec![
                    OsString::from("-e"),
                    OsString::from(&self.settings.ssh_bin),
                ];
                args.extend(ssh_args);
                SshInvocation {
                    program: self.settings.sshpass_bin.clone(),
                    args,
                    envs: vec![(OsString::from("SSHPASS"), OsString::from(password))],
                }
            }
            None => SshInvocation {
                program: self.settings.ssh_bin.clone(),
                args: ssh_args,
                envs: Vec::new(),
            },
        }
    }

    fn classify(
        &self,
        config: &BootstrapConfig,
        program: &str,
        output: CommandOutput,
    ) -> Result<(), BootstrapError> {
        if output.is_success() {
            return Ok(());
        }

        if output.code == Some(SSH_CLIENT_FAILURE)
            && ssh_connection_refused(&output.stderr, self.settings.ssh_port)
        {
            return Err(BootstrapError::ConnectionRefused {
                host: config.host.clone(),
            });
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(BootstrapError::CommandFailure {
            program: program.to_owned(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }
}

/// Detects the client's own "connect to host ... port N: Connection refused"
/// line. Remote output that mentions a refused connection does not count.
fn ssh_connection_refused(stderr: &str, port: u16) -> bool {
    let suffix = format!(" port {port}: Connection refused");
    stderr.lines().map(str::trim_end).any(|line| {
        line.starts_with("ssh: connect to host ") && line.ends_with(&suffix)
    })
}

/// Wraps `script` for execution by the remote login shell.
#[must_use]
pub fn remote_command(script: &str, use_sudo: bool) -> String {
    let command = format!("bash -c {}", escape(script.into()));
    if use_sudo {
        format!("sudo {command}")
    } else {
        command
    }
}

impl<R: CommandRunner> Bootstrapper for SshBootstrapper<R> {
    fn bootstrap(&self, config: &BootstrapConfig) -> Result<(), BootstrapError> {
        let script = self.render_script(config)?;
        let command = remote_command(&script, config.use_sudo);
        let invocation = self.invocation(config, &command);

        info!(
            host = %config.host,
            node = %config.chef_node_name,
            distro = %config.distro,
            "bootstrapping node"
        );
        let output = self
            .runner
            .run(&invocation.program, &invocation.args, &invocation.envs)?;
        self.classify(config, &invocation.program, output)
    }
}
