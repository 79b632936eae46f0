use crate::adapters::mail::{EmailMessage, Mailer};
use crate::config::MailConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer").field("from", &self.from.to_string()).finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Builds a TLS relay transport for `host`.
    ///
    /// # Errors
    /// Returns an error if the relay or sender address is invalid.
    pub fn new(host: &str, config: &MailConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self { transport: builder.build(), from: config.from.parse()? })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(skip(self, message), fields(subject = %message.subject), err(level = "warn"))]
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let to: Mailbox =
            message.to.parse().map_err(|_| AppError::Validation(format!("Invalid email address: {}", message.to)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build email");
                AppError::Internal
            })?;

        self.transport.send(email).await.map_err(|e| AppError::Upstream(format!("SMTP send failed: {e}")))?;

        tracing::info!("Email sent");
        Ok(())
    }
}
