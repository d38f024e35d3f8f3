use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use heartbeat_monitor::{
    config::{Config, read_config_file},
    monitors::heartbeat::HeartbeatMonitor,
    notify::{SmtpNotifier, send_test_notification},
    probe::select_prober,
    util::{LOG_FILE_NAME, get_config_path},
};
use tracing::{error, info, trace};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $HEARTBEAT_CONFIG or ./config.json)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Send a single test email and exit
    #[arg(long)]
    test_email: bool,
}

fn file_appender(config: &Config) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("failed to create log dir {}", config.log_dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .max_log_files(config.log_retention_days.max(1))
        .build(&config.log_dir)
        .context("failed to open log file")
}

/// Logs to stdout and to a file rotated at midnight. The returned guard
/// flushes the file writer when dropped.
fn init(config: &Config) -> anyhow::Result<WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config)?);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .with_target(false),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for interrupt: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let config = read_config_file(&path)?;

    let _guard = init(&config)?;
    trace!("started with args: {args:?}");
    info!("using config at {}", path.display());

    let notifier = SmtpNotifier::new(&config.email, config.smtp_timeout())?;

    if args.test_email {
        let delivery = send_test_notification(&notifier).await;
        return Ok(if delivery.is_sent() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let prober = select_prober();
    let mut monitor = HeartbeatMonitor::from_config(&config);

    info!(
        "Heartbeat monitor started. Interval={}s, re-alert={}s, hosts={}.",
        config.check_interval,
        config.realert_interval,
        monitor.entries().len()
    );

    monitor
        .run_forever(prober.as_ref(), &notifier, shutdown_signal())
        .await;

    info!("Heartbeat monitor stopped by user.");
    Ok(ExitCode::SUCCESS)
}
