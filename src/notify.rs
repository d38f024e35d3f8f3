//! Alert delivery
//!
//! The monitor only ever hands a [`Message`] to a [`Notifier`] and looks at
//! the resulting [`Delivery`]; how the message leaves the process is up to the
//! implementation. [`SmtpNotifier`] delivers it as a plain text email.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{error, info, instrument};

use crate::HostEntry;
use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

impl Message {
    pub fn alert(entry: &HostEntry, at: DateTime<Utc>) -> Self {
        let host = entry.display();
        Self {
            subject: format!("[ALERT] {host} is DOWN"),
            body: format!(
                "{host} is not responding to ping as of {}.",
                format_timestamp(at)
            ),
        }
    }

    pub fn clear(entry: &HostEntry, at: DateTime<Utc>) -> Self {
        let host = entry.display();
        Self {
            subject: format!("[RESOLVED] {host} is UP"),
            body: format!("{host} is responding again as of {}.", format_timestamp(at)),
        }
    }

    pub fn test() -> Self {
        Self {
            subject: String::from("[TEST] Heartbeat Monitor Email Check"),
            body: String::from("This is a test email from the Heartbeat Monitor script."),
        }
    }
}

/// Outcome of handing a message to a [`Notifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
}

impl Delivery {
    pub fn is_sent(self) -> bool {
        self == Delivery::Sent
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> anyhow::Result<()>;
}

/// Sends `message` and logs the outcome. Never fails: a transport error is
/// reported as [`Delivery::Failed`].
pub async fn deliver(
    notifier: &dyn Notifier,
    kind: &str,
    target: &str,
    message: &Message,
) -> Delivery {
    match notifier.send(message).await {
        Ok(()) => {
            info!("Sent {kind} email for {target}");
            Delivery::Sent
        }
        Err(e) => {
            error!("Failed to send {kind} email for {target}: {e:#}");
            Delivery::Failed
        }
    }
}

pub async fn send_alert(
    notifier: &dyn Notifier,
    entry: &HostEntry,
    at: DateTime<Utc>,
) -> Delivery {
    let message = Message::alert(entry, at);
    deliver(notifier, "ALERT", &entry.display(), &message).await
}

pub async fn send_clear(
    notifier: &dyn Notifier,
    entry: &HostEntry,
    at: DateTime<Utc>,
) -> Delivery {
    let message = Message::clear(entry, at);
    deliver(notifier, "CLEAR", &entry.display(), &message).await
}

/// One fixed message to validate the notifier setup, independent of any
/// monitoring state.
#[instrument(skip_all)]
pub async fn send_test_notification(notifier: &dyn Notifier) -> Delivery {
    match notifier.send(&Message::test()).await {
        Ok(()) => {
            info!("Test email sent successfully.");
            Delivery::Sent
        }
        Err(e) => {
            error!("Failed to send test email: {e:#}");
            Delivery::Failed
        }
    }
}

/// Plain text email over SMTP with STARTTLS, authenticating as the sender
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig, timeout: Duration) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .with_context(|| format!("invalid sender address '{}'", config.sender))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .with_context(|| format!("invalid recipient address '{}'", config.recipient))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid SMTP server '{}'", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.sender.clone(),
                config.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[instrument(skip_all, fields(subject = %message.subject))]
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        let email = lettre::Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;

        Ok(())
    }
}
