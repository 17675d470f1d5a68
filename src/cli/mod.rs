//! Command-line interface definitions for the `knife-euca` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `knife-euca` binary.
#[derive(Debug, Parser)]
#[command(
    name = "knife-euca",
    about = "Provision Eucalyptus servers and bootstrap them with Chef",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Manage servers.
    #[command(subcommand)]
    Server(ServerCommand),
}

/// `knife-euca server` subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum ServerCommand {
    /// Create a server and bootstrap it with Chef.
    #[command(name = "create", about = "Create a new server and bootstrap it with Chef")]
    Create(ServerCreateCommand),
}

/// Arguments for `knife-euca server create`.
#[derive(Debug, Args)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag is an independent command-line switch"
)]
pub(crate) struct ServerCreateCommand {
    /// The flavor of server (for example m1.small).
    #[arg(short = 'f', long, value_name = "FLAVOR")]
    pub(crate) flavor: Option<String>,
    /// The machine image for the server.
    #[arg(short = 'I', long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Comma separated security groups for this server.
    #[arg(short = 'G', long = "groups", value_name = "X,Y,Z")]
    pub(crate) security_groups: Option<String>,
    /// The availability zone for this server.
    #[arg(short = 'Z', long, value_name = "ZONE")]
    pub(crate) availability_zone: Option<String>,
    /// The Chef node name for the new node; defaults to the instance id.
    #[arg(short = 'N', long = "node-name", value_name = "NAME")]
    pub(crate) chef_node_name: Option<String>,
    /// The key pair injected into the server.
    #[arg(short = 'S', long = "ssh-key", value_name = "KEY")]
    pub(crate) ssh_key_name: Option<String>,
    /// The SSH username (defaults to root).
    #[arg(short = 'x', long, value_name = "USERNAME")]
    pub(crate) ssh_user: Option<String>,
    /// The SSH password.
    #[arg(short = 'P', long, value_name = "PASSWORD")]
    pub(crate) ssh_password: Option<String>,
    /// The SSH identity file used for authentication.
    #[arg(short = 'i', long, value_name = "IDENTITY_FILE")]
    pub(crate) identity_file: Option<String>,
    /// Install the pre-release Chef gems.
    #[arg(long)]
    pub(crate) prerelease: bool,
    /// The version of Chef to install.
    #[arg(long, value_name = "VERSION")]
    pub(crate) bootstrap_version: Option<String>,
    /// Bootstrap a distro using a built-in template (defaults to
    /// ubuntu10.04-gems).
    #[arg(short = 'd', long, value_name = "DISTRO")]
    pub(crate) distro: Option<String>,
    /// Full path to the location of a custom bootstrap template.
    #[arg(long, value_name = "TEMPLATE")]
    pub(crate) template_file: Option<String>,
    /// Comma separated list of roles and recipes to apply.
    #[arg(short = 'r', long, value_name = "RUN_LIST")]
    pub(crate) run_list: Option<String>,
    /// Disable host key verification.
    #[arg(long)]
    pub(crate) no_host_key_verify: bool,
    /// The Chef environment for the new node.
    #[arg(short = 'E', long, value_name = "ENVIRONMENT")]
    pub(crate) environment: Option<String>,
}
