use anyhow::Context;
use axum::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailConfig;

/// Outbound notification seam. The flows only ever hand over an address, an
/// optional display name and the finished reset URL; transport details stay
/// behind this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(
        &self,
        to: &str,
        name: Option<&str>,
        reset_url: &str,
    ) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Self> {
        let builder = match (&cfg.username, &cfg.password) {
            (Some(username), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
                    .context("failed to configure smtp relay")?
                    .credentials(Credentials::new(username.clone(), password.clone()))
            }
            // Local relays such as mailpit speak plain SMTP without auth.
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host),
        };
        let from = cfg
            .from
            .parse::<Mailbox>()
            .context("invalid SMTP from address")?;
        Ok(Self {
            transport: builder.port(cfg.port).build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        name: Option<&str>,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        let greeting = name.unwrap_or("User");
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; line-height: 1.6;">
  <h2>Hello, {greeting}!</h2>
  <p>You have requested to reset your password. Please use the link below to set a new password:</p>
  <p style="margin: 20px 0;">
    <a href="{reset_url}" style="background-color: #3498db; color: #ffffff; padding: 12px 20px; text-decoration: none; border-radius: 5px;">
      Reset Your Password
    </a>
  </p>
  <p>This link is valid for 10 minutes.</p>
  <p>If you did not request a password reset, please ignore this email.</p>
  <p>Thank you,<br>The Keygate Team</p>
</div>"#
        );
        let text = format!(
            "Hello, {greeting}!\n\n\
            You have requested to reset your password. Please use the link below to set a new password:\n\n\
            {reset_url}\n\n\
            This link is valid for 10 minutes.\n\
            If you did not request a password reset, please ignore this email.\n\n\
            Thank you,\nThe Keygate Team"
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>().context("invalid recipient address")?)
            .subject("Your password reset token (valid for 10 minutes)")
            .multipart(MultiPart::alternative_plain_html(text, html))
            .context("failed to build reset email")?;

        self.transport
            .send(message)
            .await
            .context("failed to send reset email")?;
        info!(to = %to, "password reset email sent");
        Ok(())
    }
}
