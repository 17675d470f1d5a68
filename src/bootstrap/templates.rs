//! Bootstrap script templates and their renderer.
//!
//! Built-in templates are keyed by distro name. A custom template file uses
//! the same Handlebars syntax and may include the `chef_setup` and
//! `chef_gem_install` partials.

use camino::Utf8Path;
use handlebars::Handlebars;
use serde::Serialize;

use super::BootstrapError;

/// Distro template used when none is requested.
pub const DEFAULT_DISTRO: &str = "ubuntu10.04-gems";

const CHEF_SETUP: &str = r#"mkdir -p /etc/chef

(
cat <<'EOP'
{{validation_key}}
EOP
) > /tmp/validation.pem
awk NF /tmp/validation.pem > /etc/chef/validation.pem
rm /tmp/validation.pem

(
cat <<'EOP'
log_level        :info
log_location     STDOUT
chef_server_url  "{{chef_server_url}}"
validation_client_name "{{validation_client_name}}"
node_name "{{node_name}}"
{{#if environment}}
environment "{{environment}}"
{{/if}}
EOP
) > /etc/chef/client.rb

(
cat <<'EOP'
{{first_boot}}
EOP
) > /etc/chef/first-boot.json
"#;

const CHEF_GEM_INSTALL: &str = "gem install chef --no-rdoc --no-ri --verbose\
{{#if bootstrap_version}} --version {{bootstrap_version}}\
{{else}}{{#if prerelease}} --prerelease{{/if}}{{/if}}";

const UBUNTU_GEMS: &str = r"if [ ! -f /usr/bin/chef-client ]; then
  apt-get update
  apt-get install -y ruby ruby1.8-dev build-essential wget libruby1.8 rubygems
fi

gem update --no-rdoc --no-ri
gem install ohai --no-rdoc --no-ri --verbose
{{> chef_gem_install}}

{{> chef_setup}}

chef-client -j /etc/chef/first-boot.json
";

const UBUNTU_APT: &str = r#"if [ ! -f /usr/bin/chef-client ]; then
  echo "chef chef/chef_server_url string {{chef_server_url}}" | debconf-set-selections
  [ -f /etc/apt/sources.list.d/opscode.list ] || echo "deb http://apt.opscode.com lucid-0.10 main" > /etc/apt/sources.list.d/opscode.list
  wget -O- http://apt.opscode.com/packages@opscode.com.gpg.key | apt-key add -
fi
apt-get update
DEBIAN_FRONTEND=noninteractive apt-get install -y chef

{{> chef_setup}}

/usr/bin/chef-client -j /etc/chef/first-boot.json
"#;

const CENTOS_GEMS: &str = r"if [ ! -f /usr/bin/chef-client ]; then
  rpm -Uvh http://download.fedoraproject.org/pub/epel/5/i386/epel-release-5-4.noarch.rpm
  yum install -y ruby ruby-devel gcc gcc-c++ automake autoconf make rubygems
fi

gem update --system --no-rdoc --no-ri
gem install ohai --no-rdoc --no-ri --verbose
{{> chef_gem_install}}

{{> chef_setup}}

/usr/bin/chef-client -j /etc/chef/first-boot.json
";

const FEDORA_GEMS: &str = r"yum install -y ruby ruby-devel gcc gcc-c++ automake autoconf rubygems make

gem update --system --no-rdoc --no-ri
gem install ohai --no-rdoc --no-ri --verbose
{{> chef_gem_install}}

{{> chef_setup}}

/usr/bin/chef-client -j /etc/chef/first-boot.json
";

/// Built-in bootstrap templates keyed by distro name.
pub const BUILTIN_DISTROS: &[(&str, &str)] = &[
    (DEFAULT_DISTRO, UBUNTU_GEMS),
    ("ubuntu10.04-apt", UBUNTU_APT),
    ("centos5-gems", CENTOS_GEMS),
    ("fedora13-gems", FEDORA_GEMS),
];

/// Values exposed to bootstrap templates.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateContext<'a> {
    /// Chef server URL written to `client.rb`.
    pub chef_server_url: &'a str,
    /// Validation client name written to `client.rb`.
    pub validation_client_name: &'a str,
    /// Contents of the validation key.
    pub validation_key: &'a str,
    /// Node name registered with the Chef server.
    pub node_name: &'a str,
    /// Chef environment, when one was requested.
    pub environment: Option<&'a str>,
    /// Chef gem version to install.
    pub bootstrap_version: Option<&'a str>,
    /// Whether to install pre-release gems.
    pub prerelease: bool,
    /// First-boot JSON document carrying the run list.
    pub first_boot: String,
}

/// Renders bootstrap scripts from built-in or custom templates.
#[derive(Debug)]
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Builds a renderer with every built-in template registered.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Render`] when a built-in template fails to
    /// compile.
    pub fn new() -> Result<Self, BootstrapError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        for (name, source) in [
            ("chef_setup", CHEF_SETUP),
            ("chef_gem_install", CHEF_GEM_INSTALL),
        ] {
            registry
                .register_partial(name, source)
                .map_err(|err| render_error(name, &err))?;
        }

        for (distro, source) in BUILTIN_DISTROS {
            registry
                .register_template_string(distro, source)
                .map_err(|err| render_error(distro, &err))?;
        }

        Ok(Self { registry })
    }

    /// Renders the built-in template for `distro`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::UnknownDistro`] when no built-in template
    /// matches, or [`BootstrapError::Render`] when rendering fails.
    pub fn render_distro(
        &self,
        distro: &str,
        context: &TemplateContext<'_>,
    ) -> Result<String, BootstrapError> {
        if !self.registry.has_template(distro) {
            return Err(BootstrapError::UnknownDistro {
                distro: distro.to_owned(),
                available: BUILTIN_DISTROS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        self.registry
            .render(distro, context)
            .map_err(|err| render_error(distro, &err))
    }

    /// Renders a template read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Read`] when the file cannot be read, or
    /// [`BootstrapError::Render`] when rendering fails.
    pub fn render_file(
        &self,
        path: &Utf8Path,
        context: &TemplateContext<'_>,
    ) -> Result<String, BootstrapError> {
        let source = std::fs::read_to_string(path).map_err(|err| BootstrapError::Read {
            path: path.to_string(),
            message: err.to_string(),
        })?;

        self.registry
            .render_template(&source, context)
            .map_err(|err| render_error(path.as_str(), &err))
    }
}

fn render_error(template: &str, err: &impl std::fmt::Display) -> BootstrapError {
    BootstrapError::Render {
        template: template.to_owned(),
        message: err.to_string(),
    }
}
