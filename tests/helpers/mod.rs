//! Test helpers shared by the integration and property tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use heartbeat_monitor::{
    HostEntry,
    config::{Config, EmailConfig, ServerConfig},
    monitors::heartbeat::{HeartbeatMonitor, MonitorSettings},
    notify::{Message, Notifier},
    probe::Prober,
};
use tokio::time::Instant;

/// Fixed wall clock reference for cycle timestamps
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn create_test_email_config() -> EmailConfig {
    EmailConfig {
        sender: "monitor@example.com".to_string(),
        recipient: "ops@example.com".to_string(),
        smtp_server: "smtp.example.com".to_string(),
        smtp_port: 587,
        password: "hunter2".to_string(),
    }
}

/// Config with defaults for every interval
pub fn create_test_config(servers: &[(&str, &str)]) -> Config {
    Config {
        servers: servers
            .iter()
            .map(|(name, host)| ServerConfig {
                name: name.to_string(),
                host: host.to_string(),
            })
            .collect(),
        email: create_test_email_config(),
        check_interval: 900,
        realert_interval: 3600,
        probe_timeout: 2,
        smtp_timeout: 30,
        log_dir: PathBuf::from("."),
        log_retention_days: 14,
    }
}

pub fn create_test_monitor(servers: &[(&str, &str)]) -> HeartbeatMonitor {
    HeartbeatMonitor::from_config(&create_test_config(servers))
}

pub fn create_monitor_with_interval(
    servers: &[(&str, &str)],
    interval: Duration,
) -> HeartbeatMonitor {
    let entries = servers
        .iter()
        .map(|(name, host)| HostEntry::new(*name, *host))
        .collect();
    HeartbeatMonitor::new(
        entries,
        MonitorSettings {
            check_interval: interval,
            ..MonitorSettings::default()
        },
    )
}

pub fn write_config_file(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Answers probes from a per-host script. Hosts without a script (or with an
/// exhausted one) answer with the fallback.
pub struct ScriptedProber {
    script: Mutex<HashMap<String, VecDeque<bool>>>,
    fallback: bool,
    delay: Duration,
    started: Mutex<Vec<(String, Instant)>>,
    finished: Mutex<usize>,
}

impl ScriptedProber {
    pub fn new(fallback: bool) -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            fallback,
            delay: Duration::ZERO,
            started: Mutex::new(vec![]),
            finished: Mutex::new(0),
        }
    }

    pub fn reachable() -> Self {
        Self::new(true)
    }

    pub fn unreachable() -> Self {
        Self::new(false)
    }

    pub fn with_script(self, host: &str, results: &[bool]) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(host.to_string(), results.iter().copied().collect());
        self
    }

    /// Every probe takes `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn finished(&self) -> usize {
        *self.finished.lock().unwrap()
    }

    pub fn probed_hosts(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(host, _)| host.clone())
            .collect()
    }

    /// Seconds between `start` and each probe call.
    pub fn call_offsets(&self, start: Instant) -> Vec<u64> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| at.duration_since(start).as_secs())
            .collect()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn check(&self, host: &str, _timeout: Duration) -> bool {
        self.started
            .lock()
            .unwrap()
            .push((host.to_string(), Instant::now()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .get_mut(host)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);

        *self.finished.lock().unwrap() += 1;
        result
    }
}

/// Records every delivered message; can be switched into a failing mode.
#[derive(Default)]
pub struct RecordingNotifier {
    failing: AtomicBool,
    attempts: Mutex<usize>,
    sent: Mutex<Vec<Message>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|message| message.subject)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("535 authentication failed");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
