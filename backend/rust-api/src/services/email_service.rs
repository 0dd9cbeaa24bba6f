use anyhow::{anyhow, Context};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::error::ApiError;
use crate::models::user::Account;

pub struct EmailService {
    smtp: Option<SmtpConfig>,
}

impl EmailService {
    pub fn new(smtp: Option<SmtpConfig>) -> Self {
        Self { smtp }
    }

    /// Send the password reset link to the account owner. Without SMTP
    /// configuration the link is logged instead, which keeps local
    /// development flows working.
    pub async fn send_password_reset_email(
        &self,
        account: &Account,
        uid: &str,
        token: &str,
    ) -> Result<(), ApiError> {
        let Some(settings) = &self.smtp else {
            tracing::info!(
                email = %account.email,
                uid = %uid,
                token = %token,
                "SMTP not configured, skipping password reset email"
            );
            return Ok(());
        };

        let subject = "Password reset request";
        let body = format!(
            "Hello, {}!\n\nA password reset was requested for your account.\nUse these values to set a new password:\n\nuid: {}\ntoken: {}\n\nThe link is valid for one hour. If you did not request a reset, ignore this message.\n",
            account.full_name(),
            uid,
            token
        );

        self.send(settings, account, subject, &body)
            .await
            .map_err(ApiError::internal)
    }

    async fn send(
        &self,
        settings: &SmtpConfig,
        account: &Account,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let from_address: Mailbox = format!("{} <{}>", settings.from_name, settings.from_email)
            .parse()
            .context("Invalid from email address")?;
        let to_address: Mailbox = format!("{} <{}>", account.full_name(), account.email)
            .parse()
            .context("Invalid recipient email address")?;

        let email = Message::builder()
            .from(from_address)
            .to(to_address)
            .subject(subject)
            .body(body.to_string())
            .context("Failed to build email message")?;

        let mailer = self.build_mailer(settings)?;
        mailer.send(email).await.context("Failed to send email")?;
        Ok(())
    }

    fn build_mailer(
        &self,
        settings: &SmtpConfig,
    ) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)
                .map_err(|e| anyhow!("Invalid SMTP server for TLS: {e}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
        }
        .port(settings.port)
        .credentials(creds);

        Ok(builder.build())
    }
}
