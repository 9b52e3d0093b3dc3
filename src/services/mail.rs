use crate::{config::SmtpSettings, error::Result};

/// Outbound mail used by password reset. Delivery lives outside the core.
pub trait Mailer: Send + Sync {
    fn send_reset(&self, recipient: &str, temporary_password: &str) -> Result<()>;
}

/// Records the dispatch without delivering anything.
pub struct LogMailer {
    smtp: SmtpSettings,
}

impl LogMailer {
    pub fn new(smtp: SmtpSettings) -> Self {
        Self { smtp }
    }
}

impl Mailer for LogMailer {
    fn send_reset(&self, recipient: &str, _temporary_password: &str) -> Result<()> {
        tracing::info!(
            recipient = %recipient,
            smtp_host = %self.smtp.host,
            "Password reset mail queued"
        );
        Ok(())
    }
}
