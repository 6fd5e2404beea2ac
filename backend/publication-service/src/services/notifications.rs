//! Notification Dispatcher.
//!
//! New published posts are queued on a bounded in-process channel and a single
//! detached worker resolves the author's followers and mails them. Delivery is
//! best-effort: a full queue drops the event, failures are logged, nothing is
//! retried and the write path never waits on it.

use crate::config::NotificationConfig;
use crate::db::follow_repo;
use crate::error::{AppError, Result};
use crate::metrics::notifications::{NOTIFICATION_DISPATCH_TOTAL, NOTIFICATION_QUEUE_DEPTH};
use crate::models::{OwnerKind, Post};
use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What followers are told about a new post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub post_id: i64,
    pub title: String,
    pub author: String,
    pub owner_type: OwnerKind,
}

impl NotificationPayload {
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id,
            title: post.title.clone(),
            author: post.author.clone(),
            owner_type: post.owner.kind,
        }
    }

    pub fn subject(&self) -> String {
        format!("New {} by {}", self.owner_type.label(), self.author)
    }

    pub fn html_body(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
</head>
<body style="font-family: sans-serif; padding: 20px; color: #333;">
    <h2>{subject}</h2>
    <p><strong>{author}</strong> just published a new {kind}:</p>
    <p style="font-size: 18px;">{title}</p>
</body>
</html>"#,
            subject = escape_html(&self.subject()),
            author = escape_html(&self.author),
            kind = self.owner_type.as_str(),
            title = escape_html(&self.title),
        )
    }

    /// Render the RFC 5322 message. Recipients go to Bcc, which is not part of
    /// the formatted bytes; the SMTP envelope carries them instead.
    pub fn render(&self, from: &Mailbox, recipients: &[Address]) -> Result<Vec<u8>> {
        let builder = recipients.iter().fold(
            Message::builder().from(from.clone()).subject(self.subject()),
            |builder, address| builder.bcc(Mailbox::new(None, address.clone())),
        );

        let message = builder
            .header(header::ContentType::TEXT_HTML)
            .body(self.html_body())
            .map_err(|e| AppError::Internal(format!("Failed to build notification: {}", e)))?;

        Ok(message.formatted())
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// E-mail delivery collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Current sender, read for every message so a reload takes effect on
    /// the next delivery.
    fn sender(&self) -> anyhow::Result<Mailbox>;

    /// Replace host, credentials and sender for later deliveries.
    fn reload(&self, config: &NotificationConfig) -> Result<()>;

    async fn send_notification(&self, recipients: &[String], payload: &[u8]) -> anyhow::Result<()>;
}

struct SmtpState {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

/// SMTP mailer; no-op (log only) when no host is configured.
pub struct SmtpMailer {
    state: RwLock<Arc<SmtpState>>,
}

impl SmtpMailer {
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(Arc::new(build_state(config)?)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.current().map(|s| s.transport.is_some()).unwrap_or(false)
    }

    fn current(&self) -> anyhow::Result<Arc<SmtpState>> {
        self.state
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| anyhow::anyhow!("SMTP state lock poisoned"))
    }
}

fn build_state(config: &NotificationConfig) -> Result<SmtpState> {
    let from = config
        .from_address
        .parse::<Mailbox>()
        .map_err(|e| AppError::Validation(format!("Invalid SMTP_FROM address: {}", e)))?;

    let transport = if config.is_enabled() {
        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        }
        .map_err(|e| AppError::Internal(format!("Failed to configure SMTP transport: {}", e)))?
        .port(config.smtp_port);

        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };

        Some(builder.build())
    } else {
        warn!("SMTP host not configured; notifications will operate in no-op mode");
        None
    };

    Ok(SmtpState { transport, from })
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn sender(&self) -> anyhow::Result<Mailbox> {
        Ok(self.current()?.from.clone())
    }

    /// Messages already being sent finish on the previous transport.
    fn reload(&self, config: &NotificationConfig) -> Result<()> {
        let state = Arc::new(build_state(config)?);
        let mut guard = self
            .state
            .write()
            .map_err(|_| AppError::Internal("SMTP state lock poisoned".to_string()))?;
        *guard = state;
        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP settings reloaded");
        Ok(())
    }

    async fn send_notification(&self, recipients: &[String], payload: &[u8]) -> anyhow::Result<()> {
        let state = self.current()?;
        let Some(transport) = &state.transport else {
            info!(
                recipients = recipients.len(),
                "Mailer running in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        let to = recipients
            .iter()
            .map(|r| r.parse::<Address>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(Some(state.from.email.clone()), to)?;

        transport.send_raw(&envelope, payload).await?;
        info!(recipients = recipients.len(), "Notification e-mail sent");
        Ok(())
    }
}

/// Handle used by write paths to enqueue new-post notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationPayload>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. The worker exits once every dispatcher
    /// handle has been dropped and the queue is drained.
    pub fn spawn(pool: SqlitePool, mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, pool, mailer));
        (Self { tx }, handle)
    }

    /// A dispatcher with no worker; every event is discarded.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Queue a notification for `post` without waiting.
    pub fn notify_new_post(&self, post: &Post) {
        let payload = NotificationPayload::from_post(post);
        match self.tx.try_send(payload) {
            Ok(()) => {
                NOTIFICATION_QUEUE_DEPTH.inc();
                NOTIFICATION_DISPATCH_TOTAL.with_label_values(&["queued"]).inc();
                debug!(post_id = post.id, author = %post.author, "Notification queued");
            }
            Err(TrySendError::Full(payload)) => {
                NOTIFICATION_DISPATCH_TOTAL.with_label_values(&["dropped"]).inc();
                warn!(
                    post_id = payload.post_id,
                    author = %payload.author,
                    "Notification queue full; dropping event"
                );
            }
            Err(TrySendError::Closed(payload)) => {
                NOTIFICATION_DISPATCH_TOTAL.with_label_values(&["dropped"]).inc();
                debug!(post_id = payload.post_id, "Notification worker not running; dropping event");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<NotificationPayload>,
    pool: SqlitePool,
    mailer: Arc<dyn Mailer>,
) {
    info!("Notification worker started");
    while let Some(payload) = rx.recv().await {
        NOTIFICATION_QUEUE_DEPTH.dec();
        let result = deliver(&pool, mailer.as_ref(), &payload).await;
        let outcome = match result {
            Ok(0) => "skipped",
            Ok(_) => "sent",
            Err(ref err) => {
                warn!(
                    post_id = payload.post_id,
                    author = %payload.author,
                    error = %err,
                    "Failed to deliver new-post notification"
                );
                "failed"
            }
        };
        NOTIFICATION_DISPATCH_TOTAL.with_label_values(&[outcome]).inc();
    }
    info!("Notification worker stopped");
}

/// Deliver one notification; returns the number of recipients mailed.
async fn deliver(
    pool: &SqlitePool,
    mailer: &dyn Mailer,
    payload: &NotificationPayload,
) -> anyhow::Result<usize> {
    let followers = {
        let mut conn = pool.acquire().await?;
        follow_repo::followers_of(&mut conn, &payload.author).await?
    };

    let mut recipients = Vec::with_capacity(followers.len());
    let mut addresses = Vec::with_capacity(followers.len());
    for follower in followers {
        match follower.email.parse::<Address>() {
            Ok(address) => {
                addresses.push(address);
                recipients.push(follower.email);
            }
            Err(e) => {
                debug!(username = %follower.username, error = %e, "Skipping follower without a valid e-mail");
            }
        }
    }

    if recipients.is_empty() {
        debug!(post_id = payload.post_id, "No recipients for notification");
        return Ok(0);
    }

    let from = mailer.sender()?;
    let bytes = payload.render(&from, &addresses)?;
    mailer.send_notification(&recipients, &bytes).await?;
    Ok(recipients.len())
}
