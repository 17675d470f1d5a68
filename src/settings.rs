//! Resolution of command-line options into an immutable run configuration.
//!
//! Parsing produces a [`ServerCreateOptions`] holding exactly what the user
//! typed. [`RunConfig::resolve`] then applies configuration-file fallbacks
//! and the documented defaults in a single pass, so nothing downstream looks
//! values up from ambient state.

use thiserror::Error;

use crate::bootstrap::{BootstrapSettings, DEFAULT_DISTRO};
use crate::config::EucaConfig;
use crate::provision::ServerRequest;

/// Security group applied when `--groups` is absent.
pub const DEFAULT_SECURITY_GROUP: &str = "default";

/// Remote user for the bootstrap connection when `--ssh-user` is absent.
pub const DEFAULT_SSH_USER: &str = "root";

/// Environment reported when none was requested.
pub const DEFAULT_ENVIRONMENT: &str = "_default";

/// Raw `server create` options as parsed from the command line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the boolean switches accepted on the command line"
)]
pub struct ServerCreateOptions {
    /// `--flavor`.
    pub flavor: Option<String>,
    /// `--image`.
    pub image: Option<String>,
    /// `--groups`, still comma separated.
    pub security_groups: Option<String>,
    /// `--availability-zone`.
    pub availability_zone: Option<String>,
    /// `--node-name`.
    pub chef_node_name: Option<String>,
    /// `--ssh-key`.
    pub ssh_key_name: Option<String>,
    /// `--ssh-user`.
    pub ssh_user: Option<String>,
    /// `--ssh-password`.
    pub ssh_password: Option<String>,
    /// `--identity-file`.
    pub identity_file: Option<String>,
    /// `--prerelease`.
    pub prerelease: bool,
    /// `--bootstrap-version`.
    pub bootstrap_version: Option<String>,
    /// `--distro`.
    pub distro: Option<String>,
    /// `--template-file`.
    pub template_file: Option<String>,
    /// `--run-list`, still comma or whitespace separated.
    pub run_list: Option<String>,
    /// `--no-host-key-verify`.
    pub no_host_key_verify: bool,
    /// `--environment`.
    pub environment: Option<String>,
}

/// Fully resolved configuration for one `server create` run.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the boolean switches accepted on the command line"
)]
pub struct RunConfig {
    /// Machine image to launch.
    pub image: Option<String>,
    /// Flavor to launch.
    pub flavor: Option<String>,
    /// Security groups, in the order given.
    pub security_groups: Vec<String>,
    /// Availability zone to launch in.
    pub availability_zone: Option<String>,
    /// Key pair injected at launch.
    pub ssh_key_name: Option<String>,
    /// Explicit Chef node name; the instance id is used when absent.
    pub chef_node_name: Option<String>,
    /// Remote user for the bootstrap connection.
    pub ssh_user: String,
    /// Password for the remote user.
    pub ssh_password: Option<String>,
    /// Private key used for the bootstrap connection.
    pub identity_file: Option<String>,
    /// Whether to install pre-release Chef gems.
    pub prerelease: bool,
    /// Chef version to install.
    pub bootstrap_version: Option<String>,
    /// Built-in distro template.
    pub distro: String,
    /// Custom bootstrap template.
    pub template_file: Option<String>,
    /// Roles and recipes applied on first boot.
    pub run_list: Vec<String>,
    /// Whether to skip host key verification.
    pub no_host_key_verify: bool,
    /// Chef environment for the node.
    pub environment: Option<String>,
}

/// Errors raised while resolving options.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    /// Raised when `--groups` contains no group names.
    #[error("--groups must name at least one security group")]
    EmptySecurityGroups,
    /// Raised when a flag that requires a value was given an empty one.
    #[error("{flag} must not be empty")]
    EmptyValue {
        /// Long flag name.
        flag: String,
    },
}

impl RunConfig {
    /// Resolves parsed options against configuration fallbacks and defaults.
    ///
    /// A flag given on the command line always wins, then the configuration
    /// value, then the documented default.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when `--groups` yields no names or
    /// `--ssh-user` or `--distro` is empty.
    pub fn resolve(
        options: ServerCreateOptions,
        euca: &EucaConfig,
        bootstrap: &BootstrapSettings,
    ) -> Result<Self, SettingsError> {
        let security_groups = match options.security_groups.as_deref() {
            Some(raw) => {
                let groups = split_groups(raw);
                if groups.is_empty() {
                    return Err(SettingsError::EmptySecurityGroups);
                }
                groups
            }
            None => vec![DEFAULT_SECURITY_GROUP.to_owned()],
        };

        let ssh_user = non_empty(options.ssh_user, "--ssh-user")?
            .unwrap_or_else(|| DEFAULT_SSH_USER.to_owned());
        let distro = non_empty(options.distro, "--distro")?
            .or_else(|| bootstrap.distro.clone())
            .unwrap_or_else(|| DEFAULT_DISTRO.to_owned());

        Ok(Self {
            image: options.image.or_else(|| euca.image.clone()),
            flavor: options.flavor.or_else(|| euca.flavor.clone()),
            security_groups,
            availability_zone: options
                .availability_zone
                .or_else(|| euca.availability_zone.clone()),
            ssh_key_name: options.ssh_key_name.or_else(|| euca.ssh_key_id.clone()),
            chef_node_name: options.chef_node_name,
            ssh_user,
            ssh_password: options.ssh_password,
            identity_file: options.identity_file,
            prerelease: options.prerelease,
            bootstrap_version: options
                .bootstrap_version
                .or_else(|| bootstrap.bootstrap_version.clone()),
            distro,
            template_file: options
                .template_file
                .or_else(|| bootstrap.template_file.clone()),
            run_list: options
                .run_list
                .as_deref()
                .map(split_run_list)
                .unwrap_or_default(),
            no_host_key_verify: options.no_host_key_verify,
            environment: options.environment,
        })
    }

    /// Builds the provisioning request for this run.
    #[must_use]
    pub fn server_request(&self) -> ServerRequest {
        ServerRequest::builder()
            .image_id(self.image.clone())
            .flavor_id(self.flavor.clone())
            .groups(self.security_groups.iter().cloned())
            .key_name(self.ssh_key_name.clone())
            .availability_zone(self.availability_zone.clone())
            .build()
    }

    /// Environment name shown in the final report.
    #[must_use]
    pub fn environment_label(&self) -> &str {
        self.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }
}

/// Splits a comma separated security group list, preserving order.
#[must_use]
pub fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Splits a run list on commas and whitespace, preserving order.
#[must_use]
pub fn split_run_list(raw: &str) -> Vec<String> {
    raw.split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn non_empty(value: Option<String>, flag: &str) -> Result<Option<String>, SettingsError> {
    match value {
        Some(text) if text.trim().is_empty() => Err(SettingsError::EmptyValue {
            flag: flag.to_owned(),
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bootstrap_settings, euca_config};
    use rstest::rstest;

    fn resolve(options: ServerCreateOptions) -> Result<RunConfig, SettingsError> {
        RunConfig::resolve(options, &euca_config(), &bootstrap_settings())
    }

    #[test]
    fn resolve_applies_documented_defaults() {
        let config = resolve(ServerCreateOptions::default()).expect("defaults should resolve");

        assert_eq!(config.security_groups, vec!["default"]);
        assert_eq!(config.ssh_user, "root");
        assert_eq!(config.distro, "ubuntu10.04-gems");
        assert!(config.run_list.is_empty());
        assert!(!config.no_host_key_verify);
        assert_eq!(config.environment_label(), "_default");
    }

    #[test]
    fn resolve_splits_groups_in_order() {
        let config = resolve(ServerCreateOptions {
            security_groups: Some(String::from("web,db")),
            ..ServerCreateOptions::default()
        })
        .expect("groups should resolve");

        assert_eq!(config.security_groups, vec!["web", "db"]);
    }

    #[rstest]
    #[case("web,,db", &["web", "db"])]
    #[case(" web , db ", &["web", "db"])]
    #[case("default,", &["default"])]
    fn split_groups_drops_blank_names(#[case] raw: &str, #[case] expected: &[&str]) {
        assert_eq!(split_groups(raw), expected);
    }

    #[test]
    fn resolve_rejects_group_list_without_names() {
        let err = resolve(ServerCreateOptions {
            security_groups: Some(String::from(" , ")),
            ..ServerCreateOptions::default()
        })
        .expect_err("empty group list should be rejected");

        assert_eq!(err, SettingsError::EmptySecurityGroups);
    }

    #[rstest]
    #[case("", &[])]
    #[case("role[base]", &["role[base]"])]
    #[case("role[base],recipe[nginx]", &["role[base]", "recipe[nginx]"])]
    #[case("role[base], recipe[nginx]  recipe[git]", &["role[base]", "recipe[nginx]", "recipe[git]"])]
    fn split_run_list_accepts_commas_and_whitespace(
        #[case] raw: &str,
        #[case] expected: &[&str],
    ) {
        assert_eq!(split_run_list(raw), expected);
    }

    #[test]
    fn command_line_wins_over_configuration() {
        let mut euca = euca_config();
        euca.image = Some(String::from("emi-from-config"));
        euca.flavor = Some(String::from("m1.large"));
        euca.ssh_key_id = Some(String::from("config-key"));
        euca.availability_zone = Some(String::from("cluster02"));
        let options = ServerCreateOptions {
            image: Some(String::from("emi-from-flag")),
            ..ServerCreateOptions::default()
        };

        let config =
            RunConfig::resolve(options, &euca, &bootstrap_settings()).expect("should resolve");

        assert_eq!(config.image.as_deref(), Some("emi-from-flag"));
        assert_eq!(config.flavor.as_deref(), Some("m1.large"));
        assert_eq!(config.ssh_key_name.as_deref(), Some("config-key"));
        assert_eq!(config.availability_zone.as_deref(), Some("cluster02"));
    }

    #[test]
    fn distro_falls_back_to_bootstrap_settings() {
        let mut settings = bootstrap_settings();
        settings.distro = Some(String::from("centos5-gems"));

        let config = RunConfig::resolve(ServerCreateOptions::default(), &euca_config(), &settings)
            .expect("should resolve");

        assert_eq!(config.distro, "centos5-gems");
    }

    #[rstest]
    #[case::ssh_user(ServerCreateOptions { ssh_user: Some(String::new()), ..ServerCreateOptions::default() }, "--ssh-user")]
    #[case::distro(ServerCreateOptions { distro: Some(String::from("  ")), ..ServerCreateOptions::default() }, "--distro")]
    fn resolve_rejects_empty_values(#[case] options: ServerCreateOptions, #[case] flag: &str) {
        let err = resolve(options).expect_err("empty value should be rejected");
        assert_eq!(
            err,
            SettingsError::EmptyValue {
                flag: flag.to_owned()
            }
        );
    }

    #[test]
    fn server_request_carries_resolved_values_only() {
        let config = resolve(ServerCreateOptions {
            image: Some(String::from("emi-1234")),
            flavor: Some(String::from("m1.small")),
            security_groups: Some(String::from("web,db")),
            ssh_key_name: Some(String::from("ops")),
            ..ServerCreateOptions::default()
        })
        .expect("should resolve");

        let request = config.server_request();

        assert_eq!(
            request,
            ServerRequest {
                image_id: Some(String::from("emi-1234")),
                flavor_id: Some(String::from("m1.small")),
                groups: vec![String::from("web"), String::from("db")],
                key_name: Some(String::from("ops")),
                availability_zone: None,
            }
        );
    }
}
