//! TCP probe that decides whether sshd on a new server accepts connections.
//!
//! One call to [`SshProbe::tcp_test_ssh`] is one attempt: connect, wait for
//! the server to speak, read its banner, and report. The connection is owned
//! by the attempt and dropped before the call returns on every path.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// How long an attempt waits for the server to send its banner.
pub const DEFAULT_READABLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause applied after the host refuses or cannot be routed to.
pub const DEFAULT_UNREACHABLE_BACKOFF: Duration = Duration::from_secs(2);

/// Future returned by probe transport operations.
pub type ProbeFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Connected stream used by a single probe attempt.
pub trait ProbeStream: Send {
    /// Resolves once the peer has sent data or closed the connection.
    fn readable(&mut self) -> ProbeFuture<'_, ()>;

    /// Reads the first line sent by the peer.
    fn read_banner(&mut self) -> ProbeFuture<'_, String>;
}

/// Opens probe connections.
pub trait Connector {
    /// Stream type produced by a successful connection.
    type Stream: ProbeStream;

    /// Connects to `host` on `port`.
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, Self::Stream>;
}

/// Connector backed by real TCP sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

/// TCP stream with a line buffer for reading the banner.
#[derive(Debug)]
pub struct TcpProbeStream {
    reader: BufReader<TcpStream>,
}

impl Connector for TcpConnector {
    type Stream = TcpProbeStream;

    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, Self::Stream> {
        Box::pin(async move {
            let stream = TcpStream::connect((host, port)).await?;
            Ok(TcpProbeStream {
                reader: BufReader::new(stream),
            })
        })
    }
}

impl ProbeStream for TcpProbeStream {
    fn readable(&mut self) -> ProbeFuture<'_, ()> {
        Box::pin(async move { self.reader.get_ref().readable().await })
    }

    fn read_banner(&mut self) -> ProbeFuture<'_, String> {
        Box::pin(async move {
            let mut line = Vec::new();
            self.reader.read_until(b'\n', &mut line).await?;
            Ok(String::from_utf8_lossy(&line).trim_end().to_owned())
        })
    }
}

/// Probes the SSH port of a host.
#[derive(Clone, Debug)]
pub struct SshProbe<C> {
    connector: C,
    port: u16,
    readable_timeout: Duration,
    unreachable_backoff: Duration,
}

impl<C: Connector> SshProbe<C> {
    /// Creates a probe targeting `port` with the default timings.
    #[must_use]
    pub const fn new(connector: C, port: u16) -> Self {
        Self {
            connector,
            port,
            readable_timeout: DEFAULT_READABLE_TIMEOUT,
            unreachable_backoff: DEFAULT_UNREACHABLE_BACKOFF,
        }
    }

    /// Overrides how long an attempt waits for the banner.
    #[must_use]
    pub const fn with_readable_timeout(mut self, readable_timeout: Duration) -> Self {
        self.readable_timeout = readable_timeout;
        self
    }

    /// Overrides the pause after a refused or unroutable connection.
    #[must_use]
    pub const fn with_unreachable_backoff(mut self, backoff: Duration) -> Self {
        self.unreachable_backoff = backoff;
        self
    }

    /// Port the probe connects to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Makes one probe attempt against `host`.
    ///
    /// Returns `Ok(true)` after `on_success` has run with the banner, and
    /// `Ok(false)` when the server did not answer within the timeout or the
    /// connection failed in a way that is expected while sshd starts. A
    /// refused or unroutable connection pauses before returning.
    ///
    /// # Errors
    ///
    /// Returns any other I/O error, and any error from `on_success`.
    pub async fn tcp_test_ssh<F, Fut>(&self, host: &str, on_success: F) -> io::Result<bool>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        match self.read_banner(host).await {
            Ok(Some(banner)) => {
                debug!(%host, %banner, "sshd accepting connections");
                on_success(banner).await?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => self.classify(host, err).await,
        }
    }

    async fn read_banner(&self, host: &str) -> io::Result<Option<String>> {
        let mut stream = self.connector.connect(host, self.port).await?;
        let attempt = timeout(self.readable_timeout, async {
            stream.readable().await?;
            stream.read_banner().await
        })
        .await;

        match attempt {
            Ok(banner) => banner.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn classify(&self, host: &str, err: io::Error) -> io::Result<bool> {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::PermissionDenied => {
                debug!(%host, error = %err, "ssh probe failed");
                Ok(false)
            }
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => {
                debug!(%host, error = %err, "ssh port unreachable, backing off");
                sleep(self.unreachable_backoff).await;
                Ok(false)
            }
            _ => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ProbeScript, ScriptedConnector};
    use rstest::rstest;
    use tokio::time::Instant;

    fn probe(connector: &ScriptedConnector) -> SshProbe<ScriptedConnector> {
        SshProbe::new(connector.clone(), 22)
    }

    #[tokio::test(start_paused = true)]
    async fn banner_runs_callback_once_and_releases_socket() {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::Banner(String::from("SSH-2.0-OpenSSH_6.0")));
        let mut seen = Vec::new();

        let ready = probe(&connector)
            .tcp_test_ssh("10.0.0.5", |banner| {
                seen.push(banner);
                async { Ok(()) }
            })
            .await
            .expect("probe should succeed");

        assert!(ready);
        assert_eq!(seen, vec![String::from("SSH-2.0-OpenSSH_6.0")]);
        assert_eq!(connector.connects(), vec![(String::from("10.0.0.5"), 22)]);
        assert_eq!(connector.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_without_callback() {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::Silent);
        let started = Instant::now();
        let mut called = false;

        let ready = probe(&connector)
            .tcp_test_ssh("10.0.0.5", |_| {
                called = true;
                async { Ok(()) }
            })
            .await
            .expect("timeout is not an error");

        assert!(!ready);
        assert!(!called);
        assert_eq!(started.elapsed(), DEFAULT_READABLE_TIMEOUT);
        assert_eq!(connector.released(), 1);
    }

    #[rstest]
    #[case::timed_out(io::ErrorKind::TimedOut, Duration::ZERO)]
    #[case::permission_denied(io::ErrorKind::PermissionDenied, Duration::ZERO)]
    #[case::refused(io::ErrorKind::ConnectionRefused, DEFAULT_UNREACHABLE_BACKOFF)]
    #[case::host_unreachable(io::ErrorKind::HostUnreachable, DEFAULT_UNREACHABLE_BACKOFF)]
    #[case::network_unreachable(io::ErrorKind::NetworkUnreachable, DEFAULT_UNREACHABLE_BACKOFF)]
    #[tokio::test(start_paused = true)]
    async fn transient_connect_errors_return_false(
        #[case] kind: io::ErrorKind,
        #[case] pause: Duration,
    ) {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::ConnectError(kind));
        let started = Instant::now();

        let ready = probe(&connector)
            .tcp_test_ssh("10.0.0.5", |_| async { Ok(()) })
            .await
            .expect("transient errors are not fatal");

        assert!(!ready);
        assert_eq!(started.elapsed(), pause);
        assert_eq!(connector.released(), 0, "no socket was opened");
    }

    #[rstest]
    #[case::timed_out(io::ErrorKind::TimedOut)]
    #[case::permission_denied(io::ErrorKind::PermissionDenied)]
    #[case::refused(io::ErrorKind::ConnectionRefused)]
    #[case::host_unreachable(io::ErrorKind::HostUnreachable)]
    #[case::network_unreachable(io::ErrorKind::NetworkUnreachable)]
    #[tokio::test(start_paused = true)]
    async fn transient_read_errors_release_socket(#[case] kind: io::ErrorKind) {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::ReadError(kind));

        let ready = probe(&connector)
            .tcp_test_ssh("10.0.0.5", |_| async { Ok(()) })
            .await
            .expect("transient errors are not fatal");

        assert!(!ready);
        assert_eq!(connector.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_propagate() {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::ConnectError(io::ErrorKind::InvalidInput));

        let err = probe(&connector)
            .tcp_test_ssh("bad host", |_| async { Ok(()) })
            .await
            .expect_err("unexpected errors should propagate");

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_errors_propagate_after_release() {
        let connector = ScriptedConnector::new();
        connector.push(ProbeScript::Banner(String::from("SSH-2.0-OpenSSH_6.0")));
        let probe = probe(&connector);

        let err = probe
            .tcp_test_ssh("10.0.0.5", |_| {
                let released = connector.released();
                async move {
                    assert_eq!(released, 1, "socket closed before callback");
                    Err(io::Error::other("stdout closed"))
                }
            })
            .await
            .expect_err("callback failure should surface");

        assert_eq!(err.to_string(), "stdout closed");
    }
}
