//! Cycle scheduling on a paused clock

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_cycles_start_one_interval_apart() {
    let mut monitor =
        create_monitor_with_interval(&[("web1", "10.0.0.1")], Duration::from_secs(900));
    let prober = ScriptedProber::reachable();
    let notifier = RecordingNotifier::default();

    let start = Instant::now();
    let shutdown = tokio::time::sleep(Duration::from_secs(2699));
    monitor.run_forever(&prober, &notifier, shutdown).await;

    assert_eq!(prober.call_offsets(start), vec![0, 900, 1800]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_followed_immediately() {
    let mut monitor =
        create_monitor_with_interval(&[("web1", "10.0.0.1")], Duration::from_secs(900));
    let prober = ScriptedProber::reachable().with_delay(Duration::from_secs(1000));
    let notifier = RecordingNotifier::default();

    let start = Instant::now();
    let shutdown = tokio::time::sleep(Duration::from_secs(2500));
    monitor.run_forever(&prober, &notifier, shutdown).await;

    assert_eq!(prober.call_offsets(start), vec![0, 1000, 2000]);
    // the third cycle was interrupted mid-probe
    assert_eq!(prober.finished(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_partial_overrun_sleeps_the_remainder() {
    let mut monitor = create_monitor_with_interval(
        &[("a", "10.0.0.1"), ("b", "10.0.0.2")],
        Duration::from_secs(60),
    );
    let prober = ScriptedProber::reachable().with_delay(Duration::from_secs(20));
    let notifier = RecordingNotifier::default();

    let start = Instant::now();
    let shutdown = tokio::time::sleep(Duration::from_secs(100));
    monitor.run_forever(&prober, &notifier, shutdown).await;

    // two hosts at 20s each, then 20s of sleep before the next cycle
    assert_eq!(prober.call_offsets(start), vec![0, 20, 60, 80]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_cycle_completes() {
    let mut monitor =
        create_monitor_with_interval(&[("web1", "10.0.0.1")], Duration::from_secs(900));
    let prober = ScriptedProber::unreachable().with_delay(Duration::from_secs(2));
    let notifier = RecordingNotifier::default();

    monitor
        .run_forever(&prober, &notifier, tokio::time::sleep(Duration::from_secs(1)))
        .await;

    assert_eq!(prober.calls(), 1);
    assert_eq!(prober.finished(), 0);
    assert!(notifier.sent().is_empty());
    assert!(!monitor.entries()[0].is_down);
}
