pub mod config;
pub mod monitors;
pub mod notify;
pub mod probe;
pub mod util;

use chrono::{DateTime, Utc};

use crate::config::ServerConfig;

/// Known health of one monitored host.
///
/// `last_alert` is only ever `Some` while `is_down` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub name: String,
    pub host: String,
    pub is_down: bool,
    pub last_alert: Option<DateTime<Utc>>,
}

impl HostEntry {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            is_down: false,
            last_alert: None,
        }
    }

    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.host)
    }
}

impl From<&ServerConfig> for HostEntry {
    fn from(server: &ServerConfig) -> Self {
        HostEntry::new(server.name.clone(), server.host.clone())
    }
}
