use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Transactional email sender.
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

/// Writes outgoing mail to the log instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "Email not delivered (no SMTP relay configured)");
        tracing::debug!(html = %message.html, "Email body");
        Ok(())
    }
}

/// Records outgoing mail so tests can read links back out of it.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent.lock().await.iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}
