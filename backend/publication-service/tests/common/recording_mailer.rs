//! Mailer that keeps every message in memory instead of sending it.

use async_trait::async_trait;
use lettre::message::Mailbox;
use publication_service::config::NotificationConfig;
use publication_service::services::Mailer;
use publication_service::AppError;
use std::sync::{Arc, Mutex};

/// One captured delivery: envelope recipients plus the rendered message.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipients: Vec<String>,
    pub bytes: Vec<u8>,
}

impl SentMail {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    sender: Arc<Mutex<Mailbox>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        let sender = NotificationConfig::default()
            .from_address
            .parse()
            .unwrap();
        Self {
            sent: Arc::default(),
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// How many messages were addressed to `email`.
    pub fn count_for(&self, email: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|mail| mail.recipients.iter().any(|r| r == email))
            .count()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn sender(&self) -> anyhow::Result<Mailbox> {
        Ok(self.sender.lock().unwrap().clone())
    }

    fn reload(&self, config: &NotificationConfig) -> publication_service::Result<()> {
        let sender = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        *self.sender.lock().unwrap() = sender;
        Ok(())
    }

    async fn send_notification(&self, recipients: &[String], payload: &[u8]) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentMail {
            recipients: recipients.to_vec(),
            bytes: payload.to_vec(),
        });
        Ok(())
    }
}
