use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub servers: Vec<ServerConfig>,

    pub email: EmailConfig,

    /// Seconds between the start of two cycles
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Minimum seconds between two alerts for a host that stays down
    #[serde(default = "default_realert_interval")]
    pub realert_interval: u64,

    /// Seconds to wait for a single echo reply
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Upper bound in seconds for one SMTP delivery
    #[serde(default = "default_smtp_timeout")]
    pub smtp_timeout: u64,

    /// Directory of the rotating log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: usize,
}

impl Config {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn realert_interval(&self) -> Duration {
        Duration::from_secs(self.realert_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout)
    }

    /// Rejects documents the monitor must not start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_empty() {
            bail!("no servers configured");
        }

        let mut hosts = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                bail!("server with host '{}' has an empty name", server.host);
            }
            if server.host.trim().is_empty() {
                bail!("server '{}' has an empty host", server.name);
            }
            if !hosts.insert(server.host.as_str()) {
                bail!("host '{}' is configured more than once", server.host);
            }
        }

        if self.email.password.is_empty() {
            bail!(
                "no SMTP password configured (set email.password or {})",
                crate::util::SMTP_PASSWORD
            );
        }

        check_range("check_interval", self.check_interval, 1, MAX_INTERVAL_SECS)?;
        check_range("realert_interval", self.realert_interval, 1, MAX_INTERVAL_SECS)?;
        check_range("probe_timeout", self.probe_timeout, 1, MAX_TIMEOUT_SECS)?;
        check_range("smtp_timeout", self.smtp_timeout, 1, MAX_TIMEOUT_SECS)?;

        Ok(())
    }
}

/// Upper bound for `check_interval` and `realert_interval` (30 days)
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Upper bound for `probe_timeout` and `smtp_timeout`
pub const MAX_TIMEOUT_SECS: u64 = 10 * 60;

fn check_range(name: &str, value: u64, min: u64, max: u64) -> anyhow::Result<()> {
    if !(min..=max).contains(&value) {
        bail!("{name} must be between {min} and {max} seconds, got {value}");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
}

#[derive(Clone, serde::Deserialize)]
pub struct EmailConfig {
    pub sender: String,
    pub recipient: String,
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_check_interval() -> u64 {
    15 * 60
}

fn default_realert_interval() -> u64 {
    60 * 60
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_smtp_port() -> u16 {
    587
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_retention_days() -> usize {
    14
}

/// Parses a configuration document. `.toml` files are read as TOML, anything
/// else as JSON.
pub fn parse_config(path: &Path, content: &str) -> anyhow::Result<Config> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(content).context("invalid TOML configuration")
    } else {
        serde_json::from_str(content).context("invalid JSON configuration")
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("config not found at {}", path.display());
    }

    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;

    let mut config = parse_config(path, &file_content)
        .with_context(|| format!("invalid configuration file {}", path.display()))?;

    if let Some(password) = crate::util::get_smtp_password() {
        config.email.password = password;
    }

    config
        .validate()
        .with_context(|| format!("invalid configuration file {}", path.display()))?;

    trace!("loaded config: {config:?}");
    Ok(config)
}
