//! Host reachability probes
//!
//! A [`Prober`] answers a single question: does this host answer an echo
//! request within the timeout? Every failure mode (resolution errors, socket
//! permissions, missing utilities) collapses into `false`.
//!
//! Two implementations exist and one is picked at startup by
//! [`select_prober`]:
//!
//! - [`IcmpProber`] sends echo requests itself. It prefers an unprivileged
//!   datagram ICMP socket and falls back to a raw socket when the platform
//!   only offers that one.
//! - [`CommandProber`] shells out to the platform's `ping` utility, used when
//!   no ICMP socket can be opened at all.

use std::future::Future;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

/// Reachability check for a single host
#[async_trait]
pub trait Prober: Send + Sync {
    /// `true` if `host` replied within `timeout`.
    async fn check(&self, host: &str, timeout: Duration) -> bool;
}

const PAYLOAD: [u8; 32] = [0; 32];

/// Resolves `host` to the first address it maps to, bounded by `timeout`.
pub async fn resolve(host: &str, timeout: Duration) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }

    match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(mut addrs)) => addrs.next().map(|addr| addr.ip()),
        Ok(Err(e)) => {
            debug!("{host}: failed to resolve: {e}");
            None
        }
        Err(_) => {
            debug!("{host}: resolution timed out");
            None
        }
    }
}

/// Echo requests over ICMP sockets owned by the process
pub struct IcmpProber {
    v4: Client,
    v6: Option<Client>,
}

impl IcmpProber {
    /// Opens the ICMP sockets. Must be called from within a tokio runtime.
    ///
    /// Fails if not even an IPv4 socket can be opened; an unavailable IPv6
    /// stack only disables probing of IPv6 hosts.
    pub fn new() -> std::io::Result<Self> {
        let v4 = Client::new(&Config::builder().kind(ICMP::V4).build())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("IPv6 probing unavailable: {e}");
                None
            }
        };

        Ok(Self { v4, v6 })
    }
}

impl IcmpProber {
    /// Resolves and pings, giving the echo whatever is left of `timeout`.
    async fn echo(&self, host: &str, timeout: Duration) -> bool {
        let started = Instant::now();
        let Some(ip) = resolve(host, timeout).await else {
            return false;
        };

        let client = match (ip, &self.v6) {
            (IpAddr::V4(_), _) => &self.v4,
            (IpAddr::V6(_), Some(v6)) => v6,
            (IpAddr::V6(_), None) => {
                debug!("{host}: resolved to {ip} but IPv6 probing is unavailable");
                return false;
            }
        };

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return false;
        }

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(remaining);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_, rtt)) => {
                trace!("{host}: reply from {ip} in {rtt:?}");
                true
            }
            Err(e) => {
                debug!("{host}: no reply from {ip}: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    #[instrument(skip(self))]
    async fn check(&self, host: &str, timeout: Duration) -> bool {
        within_deadline(host, timeout, self.echo(host, timeout)).await
    }
}

/// Runs a whole probe against one deadline. A probe still pending when
/// `timeout` runs out counts as unreachable.
pub async fn within_deadline<F>(host: &str, timeout: Duration, probe: F) -> bool
where
    F: Future<Output = bool>,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(reachable) => reachable,
        Err(_) => {
            debug!("{host}: no answer within {timeout:?}");
            false
        }
    }
}

/// Echo requests through the system `ping` utility
#[derive(Debug, Clone)]
pub struct CommandProber {
    program: String,
}

impl Default for CommandProber {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProber {
    pub fn new() -> Self {
        Self {
            program: String::from("ping"),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// One echo request, waiting at most `timeout` for the reply.
#[cfg(target_os = "linux")]
fn ping_args(timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    vec!["-c".into(), "1".into(), "-W".into(), secs.to_string()]
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
fn ping_args(timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    vec!["-c".into(), "1".into(), "-t".into(), secs.to_string()]
}

#[cfg(windows)]
fn ping_args(timeout: Duration) -> Vec<String> {
    let millis = timeout.as_millis().max(1);
    vec!["-n".into(), "1".into(), "-w".into(), millis.to_string()]
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    windows
)))]
fn ping_args(_timeout: Duration) -> Vec<String> {
    vec!["-c".into(), "1".into()]
}

#[async_trait]
impl Prober for CommandProber {
    #[instrument(skip(self))]
    async fn check(&self, host: &str, timeout: Duration) -> bool {
        // would otherwise be parsed as an option by the utility
        if host.starts_with('-') {
            warn!("{host}: refusing to probe host that looks like an option");
            return false;
        }

        let status = Command::new(&self.program)
            .args(ping_args(timeout))
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // the utility enforces the timeout itself, this only guards against
        // it hanging on resolution
        let limit = timeout.saturating_add(Duration::from_secs(1));
        match tokio::time::timeout(limit, status).await {
            Ok(Ok(status)) => {
                trace!("{host}: {} exited with {status}", self.program);
                status.success()
            }
            Ok(Err(e)) => {
                debug!("{host}: failed to run {}: {e}", self.program);
                false
            }
            Err(_) => {
                debug!("{host}: {} did not finish in time", self.program);
                false
            }
        }
    }
}

/// Picks the prober for this process: ICMP sockets when they can be opened,
/// the system utility otherwise.
pub fn select_prober() -> Box<dyn Prober> {
    match IcmpProber::new() {
        Ok(prober) => {
            debug!("probing hosts over ICMP sockets");
            Box::new(prober)
        }
        Err(e) => {
            warn!("cannot open ICMP socket ({e}), falling back to the system ping utility");
            Box::new(CommandProber::new())
        }
    }
}
