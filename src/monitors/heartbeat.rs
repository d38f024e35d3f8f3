//! Heartbeat monitor - polls every host once per cycle and alerts on changes
//!
//! ## Host State Machine
//!
//! Every host starts as UP. One probe per cycle decides the next state:
//!
//! ```text
//! UP   + reachable                         → Transition::Ok          (nothing sent)
//! UP   + unreachable                       → Transition::GoesDown    (alert)
//! DOWN + reachable                         → Transition::Recovered   (clear)
//! DOWN + unreachable, no alert delivered
//!        or re-alert interval elapsed      → Transition::Realert     (alert)
//! DOWN + unreachable, alerted recently     → Transition::StillDown   (nothing sent)
//! ```
//!
//! The alert time is only recorded once an alert was actually delivered, so a
//! failed alert is retried on the next cycle. A recovery clears the state even
//! if the clear notification could not be delivered.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::HostEntry;
use crate::config::Config;
use crate::notify::{self, Delivery, Notifier};
use crate::probe::Prober;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ok,
    GoesDown,
    Recovered,
    Realert,
    StillDown,
}

impl Transition {
    pub fn evaluate(
        is_down: bool,
        last_alert: Option<DateTime<Utc>>,
        reachable: bool,
        now: DateTime<Utc>,
        realert_interval: Duration,
    ) -> Transition {
        match (is_down, reachable) {
            (false, true) => Transition::Ok,
            (false, false) => Transition::GoesDown,
            (true, true) => Transition::Recovered,
            (true, false) => {
                if realert_due(last_alert, now, realert_interval) {
                    Transition::Realert
                } else {
                    Transition::StillDown
                }
            }
        }
    }
}

/// A host without a delivered alert is always due.
pub fn realert_due(
    last_alert: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    realert_interval: Duration,
) -> bool {
    let Some(last) = last_alert else {
        return true;
    };

    let interval = TimeDelta::from_std(realert_interval).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(last) >= interval
}

/// Time left until the next re-alert is due, `None` when one is due already
/// or no alert was delivered yet.
pub fn realert_remaining(
    last_alert: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    realert_interval: Duration,
) -> Option<TimeDelta> {
    let interval = TimeDelta::from_std(realert_interval).ok()?;
    let due_at = last_alert?.checked_add_signed(interval)?;
    let remaining = due_at.signed_duration_since(now);
    (remaining > TimeDelta::zero()).then_some(remaining)
}

/// Time to sleep after a cycle that took `elapsed`, so that the next cycle
/// starts `interval` after the previous one started. Overlong cycles are
/// followed immediately by the next one.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Tally of a single cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub up: usize,
    pub down: usize,
    pub sent: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.sent += 1,
            Delivery::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub realert_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(15 * 60),
            realert_interval: Duration::from_secs(60 * 60),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            check_interval: config.check_interval(),
            realert_interval: config.realert_interval(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

/// Owns the state of every monitored host for the lifetime of the process
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    entries: Vec<HostEntry>,
    settings: MonitorSettings,
}

impl HeartbeatMonitor {
    pub fn new(entries: Vec<HostEntry>, settings: MonitorSettings) -> Self {
        Self { entries, settings }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.servers.iter().map(HostEntry::from).collect(),
            MonitorSettings::from(config),
        )
    }

    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    pub fn entry(&self, host: &str) -> Option<&HostEntry> {
        self.entries.iter().find(|entry| entry.host == host)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Probes every host once and applies the transition policy, judging all
    /// hosts against the same `now`.
    #[instrument(skip_all)]
    pub async fn run_cycle(
        &mut self,
        prober: &dyn Prober,
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let MonitorSettings {
            realert_interval,
            probe_timeout,
            ..
        } = self.settings;
        let mut report = CycleReport::default();

        for entry in &mut self.entries {
            let reachable = prober.check(&entry.host, probe_timeout).await;
            let transition = Transition::evaluate(
                entry.is_down,
                entry.last_alert,
                reachable,
                now,
                realert_interval,
            );

            match transition {
                Transition::Ok => {
                    info!("{} OK", entry.display());
                }
                Transition::GoesDown => {
                    warn!("{} DOWN", entry.display());
                    let delivery = notify::send_alert(notifier, entry, now).await;
                    entry.is_down = true;
                    entry.last_alert = delivery.is_sent().then_some(now);
                    report.record(delivery);
                }
                Transition::Recovered => {
                    warn!("{} RECOVERED", entry.display());
                    let delivery = notify::send_clear(notifier, entry, now).await;
                    entry.is_down = false;
                    entry.last_alert = None;
                    report.record(delivery);
                }
                Transition::Realert => {
                    warn!("{} still DOWN (hourly re-alert)", entry.display());
                    let delivery = notify::send_alert(notifier, entry, now).await;
                    if delivery.is_sent() {
                        entry.last_alert = Some(now);
                    }
                    report.record(delivery);
                }
                Transition::StillDown => {
                    let remaining = realert_remaining(entry.last_alert, now, realert_interval)
                        .map_or(0, |remaining| remaining.num_seconds());
                    debug!(
                        "{} still DOWN, next re-alert in {remaining}s",
                        entry.display()
                    );
                }
            }

            if entry.is_down {
                report.down += 1;
            } else {
                report.up += 1;
            }
        }

        report
    }

    /// Runs cycles until `shutdown` completes. Each cycle starts
    /// `check_interval` after the previous one started, or right away if the
    /// previous one took longer. `shutdown` is observed at any await point, so
    /// an in-flight cycle is abandoned.
    #[instrument(skip_all)]
    pub async fn run_forever<F>(
        &mut self,
        prober: &dyn Prober,
        notifier: &dyn Notifier,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let interval = self.settings.check_interval;
        tokio::pin!(shutdown);

        loop {
            let cycle_start = Instant::now();
            let now = Utc::now();

            tokio::select! {
                _ = &mut shutdown => break,
                report = self.run_cycle(prober, notifier, now) => {
                    debug!(
                        "cycle done: {} up, {} down, {} sent, {} failed",
                        report.up, report.down, report.sent, report.failed
                    );
                }
            }

            let delay = next_delay(interval, cycle_start.elapsed());
            if delay.is_zero() {
                warn!(
                    "cycle took {:?}, longer than the {interval:?} interval",
                    cycle_start.elapsed()
                );
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
