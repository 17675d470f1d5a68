//! Human-readable progress and summary output for `server create`.

use std::io::{self, IsTerminal, Write};

use colored::Colorize;

use crate::provision::ServerInstance;
use crate::settings::RunConfig;

/// Writes labelled instance details and progress markers.
#[derive(Debug)]
pub struct Reporter<W: Write> {
    out: W,
    colour: bool,
}

impl Reporter<io::Stdout> {
    /// Reporter writing to standard output, coloured when it is a terminal.
    #[must_use]
    pub fn stdout() -> Self {
        let out = io::stdout();
        let colour = out.is_terminal();
        Self::new(out, colour)
    }
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter over `out`.
    pub const fn new(out: W, colour: bool) -> Self {
        Self { out, colour }
    }

    /// Consumes the reporter and returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints the details known as soon as the server is launched.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn server_created(&mut self, server: &ServerInstance) -> io::Result<()> {
        self.field("Instance ID", &server.id)?;
        self.field("Flavor", optional(server.flavor_id.as_ref()))?;
        self.field("Image", optional(server.image_id.as_ref()))?;
        self.field(
            "Availability Zone",
            optional(server.availability_zone.as_ref()),
        )?;
        self.field("Security Groups", &server.groups.join(", "))?;
        self.field("SSH Key", optional(server.key_name.as_ref()))
    }

    /// Starts the readiness progress line.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn waiting_for_server(&mut self) -> io::Result<()> {
        self.heading("Waiting for server")
    }

    /// Prints one readiness or probe attempt marker.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn progress(&mut self) -> io::Result<()> {
        self.marker(".")
    }

    /// Prints the marker for a forbidden response during the readiness wait.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn forbidden(&mut self) -> io::Result<()> {
        self.marker("x")
    }

    /// Ends the readiness line and prints the addresses of the running server.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn server_ready(&mut self, server: &ServerInstance) -> io::Result<()> {
        writeln!(self.out)?;
        self.field("Public DNS Name", optional(server.dns_name.as_ref()))?;
        self.field(
            "Private DNS Name",
            optional(server.private_dns_name.as_ref()),
        )
    }

    /// Starts the sshd progress line.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn waiting_for_sshd(&mut self) -> io::Result<()> {
        self.heading("Waiting for sshd")
    }

    /// Ends the sshd progress line.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn sshd_ready(&mut self) -> io::Result<()> {
        writeln!(self.out, "done")?;
        self.out.flush()
    }

    /// Prints the final summary once the node is bootstrapped.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn bootstrap_complete(
        &mut self,
        server: &ServerInstance,
        config: &RunConfig,
    ) -> io::Result<()> {
        writeln!(self.out)?;
        self.field("Instance ID", &server.id)?;
        self.field("Flavor", optional(server.flavor_id.as_ref()))?;
        self.field("Image", optional(server.image_id.as_ref()))?;
        self.field(
            "Availability Zone",
            optional(server.availability_zone.as_ref()),
        )?;
        self.field("Security Groups", &server.groups.join(", "))?;
        self.field("Public DNS Name", optional(server.dns_name.as_ref()))?;
        self.field(
            "Private DNS Name",
            optional(server.private_dns_name.as_ref()),
        )?;
        self.field("SSH Key", optional(server.key_name.as_ref()))?;
        self.field("Environment", config.environment_label())?;
        self.field("Run List", &config.run_list.join(", "))?;
        self.out.flush()
    }

    fn field(&mut self, label: &str, value: &str) -> io::Result<()> {
        if self.colour {
            writeln!(self.out, "{}: {value}", label.cyan())
        } else {
            writeln!(self.out, "{label}: {value}")
        }
    }

    fn heading(&mut self, text: &str) -> io::Result<()> {
        if self.colour {
            write!(self.out, "\n{}", text.magenta())?;
        } else {
            write!(self.out, "\n{text}")?;
        }
        self.out.flush()
    }

    fn marker(&mut self, marker: &str) -> io::Result<()> {
        write!(self.out, "{marker}")?;
        self.out.flush()
    }
}

fn optional(value: Option<&String>) -> &str {
    value.map_or("", String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ServerCreateOptions;
    use crate::test_support::{bootstrap_settings, euca_config, sample_server};

    fn render(write: impl FnOnce(&mut Reporter<Vec<u8>>) -> io::Result<()>) -> String {
        let mut reporter = Reporter::new(Vec::new(), false);
        write(&mut reporter).expect("writing to a buffer succeeds");
        String::from_utf8(reporter.into_inner()).expect("utf8 output")
    }

    #[test]
    fn server_created_lists_launch_details() {
        let output = render(|reporter| reporter.server_created(&sample_server()));

        assert_eq!(
            output,
            "Instance ID: i-4B2A07E1\n\
             Flavor: m1.small\n\
             Image: emi-1A2B3C4D\n\
             Availability Zone: cluster01\n\
             Security Groups: default\n\
             SSH Key: ops\n"
        );
    }

    #[test]
    fn progress_markers_share_one_line() {
        let output = render(|reporter| {
            reporter.waiting_for_server()?;
            reporter.progress()?;
            reporter.forbidden()?;
            reporter.progress()?;
            reporter.server_ready(&sample_server())?;
            reporter.waiting_for_sshd()?;
            reporter.progress()?;
            reporter.sshd_ready()
        });

        assert_eq!(
            output,
            "\nWaiting for server.x.\n\
             Public DNS Name: 10.0.0.5\n\
             Private DNS Name: 172.16.0.5\n\
             \nWaiting for sshd.done\n"
        );
    }

    #[test]
    fn final_summary_defaults_environment_and_prints_empty_run_list() {
        let config = RunConfig::resolve(
            ServerCreateOptions::default(),
            &euca_config(),
            &bootstrap_settings(),
        )
        .expect("defaults resolve");

        let output = render(|reporter| reporter.bootstrap_complete(&sample_server(), &config));

        assert!(output.starts_with("\nInstance ID: i-4B2A07E1\n"));
        assert!(output.contains("Environment: _default\n"));
        assert!(output.ends_with("Run List: \n"));
    }

    #[test]
    fn final_summary_joins_run_list() {
        let config = RunConfig::resolve(
            ServerCreateOptions {
                run_list: Some(String::from("role[base] recipe[nginx]")),
                environment: Some(String::from("production")),
                ..ServerCreateOptions::default()
            },
            &euca_config(),
            &bootstrap_settings(),
        )
        .expect("options resolve");

        let output = render(|reporter| reporter.bootstrap_complete(&sample_server(), &config));

        assert!(output.contains("Environment: production\n"));
        assert!(output.contains("Run List: role[base], recipe[nginx]\n"));
    }

    #[test]
    fn colour_wraps_labels_only() {
        colored::control::set_override(true);
        let mut reporter = Reporter::new(Vec::new(), true);
        reporter
            .server_created(&sample_server())
            .expect("writing to a buffer succeeds");
        let output = String::from_utf8(reporter.into_inner()).expect("utf8 output");

        assert!(output.contains("\u{1b}[36mInstance ID\u{1b}[0m: i-4B2A07E1"));
    }
}
