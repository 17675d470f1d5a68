//! Bootstrap and SSH settings loaded via `ortho-config`.
//!
//! [`BootstrapSettings`] carries the values the bootstrap template needs from
//! the Chef side (server URL, validation credentials) together with the SSH
//! client binaries used to reach the new server.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use super::BootstrapError;

/// SSH port probed and used for the bootstrap connection.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Seconds to wait after sshd first answers before bootstrapping.
pub const DEFAULT_INITIAL_SLEEP_DELAY_SECS: u64 = 20;

/// Client name used to register new nodes with the Chef server.
pub const DEFAULT_VALIDATION_CLIENT_NAME: &str = "chef-validator";

/// Location of the validation key on the workstation.
pub const DEFAULT_VALIDATION_KEY: &str = "/etc/chef/validation.pem";

/// Bootstrap settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EUCA_BOOTSTRAP",
    discovery(
        app_name = "knife-euca",
        env_var = "KNIFE_EUCA_CONFIG_PATH",
        config_file_name = "knife-euca.toml",
        dotfile_name = ".knife-euca.toml",
        project_file_name = "knife-euca.toml"
    )
)]
pub struct BootstrapSettings {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `sshpass` executable, used only with password logins.
    #[ortho_config(default = "sshpass".to_owned())]
    pub sshpass_bin: String,
    /// Port used for the SSH probe and bootstrap connection.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,
    /// Seconds to wait after sshd first accepts connections.
    #[ortho_config(default = DEFAULT_INITIAL_SLEEP_DELAY_SECS)]
    pub initial_sleep_delay_secs: u64,
    /// URL of the Chef server new nodes register with.
    #[ortho_config(default = String::new())]
    pub chef_server_url: String,
    /// Client name paired with the validation key.
    #[ortho_config(default = DEFAULT_VALIDATION_CLIENT_NAME.to_owned())]
    pub validation_client_name: String,
    /// Path to the validation key copied onto the node. Supports `~/`.
    #[ortho_config(default = DEFAULT_VALIDATION_KEY.to_owned())]
    pub validation_key: String,
    /// Fallback distro template when `--distro` is not given.
    pub distro: Option<String>,
    /// Fallback Chef version when `--bootstrap-version` is not given.
    pub bootstrap_version: Option<String>,
    /// Fallback template path when `--template-file` is not given.
    pub template_file: Option<String>,
}

impl BootstrapSettings {
    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidSettings`] naming the first empty
    /// field.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.sshpass_bin, "sshpass_bin")?;
        Self::require_value(&self.chef_server_url, "chef_server_url")?;
        Self::require_value(&self.validation_client_name, "validation_client_name")?;
        Self::require_value(&self.validation_key, "validation_key")?;
        if self.ssh_port == 0 {
            return Err(BootstrapError::InvalidSettings {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    /// Loads settings from defaults, configuration files, and environment
    /// variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Load`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, BootstrapError> {
        Self::load_from_iter([std::ffi::OsString::from("knife-euca")])
            .map_err(|err| BootstrapError::Load(err.to_string()))
    }

    /// Delay applied once sshd first answers the probe.
    #[must_use]
    pub const fn initial_sleep_delay(&self) -> Duration {
        Duration::from_secs(self.initial_sleep_delay_secs)
    }

    fn require_value(value: &str, field: &str) -> Result<(), BootstrapError> {
        if value.trim().is_empty() {
            return Err(BootstrapError::InvalidSettings {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
