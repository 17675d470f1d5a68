//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Region name used when signing requests against a Eucalyptus endpoint.
pub const DEFAULT_REGION: &str = "eucalyptus";

/// Eucalyptus credentials, endpoint, and knife-style fallbacks derived from
/// environment variables and configuration files.
///
/// The `image`, `flavor`, `availability_zone`, and `ssh_key_id` fields are
/// only consulted when the matching command-line flag is absent.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EUCA",
    discovery(
        app_name = "knife-euca",
        env_var = "KNIFE_EUCA_CONFIG_PATH",
        config_file_name = "knife-euca.toml",
        dotfile_name = ".knife-euca.toml",
        project_file_name = "knife-euca.toml"
    )
)]
pub struct EucaConfig {
    /// Access key identifier issued by the cloud administrator.
    #[ortho_config(default = String::new())]
    pub access_key_id: String,
    /// Secret access key paired with [`EucaConfig::access_key_id`].
    #[ortho_config(default = String::new())]
    pub secret_access_key: String,
    /// EC2-compatible API endpoint (for example
    /// `http://cloud.example:8773/services/Eucalyptus`).
    #[ortho_config(default = String::new())]
    pub api_endpoint: String,
    /// Region name used for request signing.
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    pub region: String,
    /// Fallback machine image when `--image` is not given.
    pub image: Option<String>,
    /// Fallback flavor when `--flavor` is not given.
    pub flavor: Option<String>,
    /// Fallback availability zone when `--availability-zone` is not given.
    pub availability_zone: Option<String>,
    /// Fallback key pair when `--ssh-key` is not given.
    pub ssh_key_id: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl EucaConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [euca] in knife-euca.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("knife-euca")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key that supply the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.access_key_id,
            &FieldMetadata::new(
                "Eucalyptus access key id",
                "EUCA_ACCESS_KEY_ID",
                "access_key_id",
            ),
        )?;
        Self::require_field(
            &self.secret_access_key,
            &FieldMetadata::new(
                "Eucalyptus secret access key",
                "EUCA_SECRET_ACCESS_KEY",
                "secret_access_key",
            ),
        )?;
        Self::require_field(
            &self.api_endpoint,
            &FieldMetadata::new("Eucalyptus API endpoint", "EUCA_API_ENDPOINT", "api_endpoint"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("signing region", "EUCA_REGION", "region"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
