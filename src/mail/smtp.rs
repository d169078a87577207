use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{templates, MailKind, Mailer};
use crate::config::SmtpConfig;

/// Sends mail through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, from: &str, timeout: Duration) -> anyhow::Result<Self> {
        let from: Mailbox = from.parse().context("invalid MAIL_FROM address")?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("create SMTP transport")?
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .port(cfg.port)
            .pool_config(PoolConfig::new().max_size(4))
            .timeout(Some(timeout))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, kind: MailKind, link: &str) -> anyhow::Result<()> {
        let email = templates::render(kind, link);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>().context("invalid recipient address")?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("build email")?;

        self.transport.send(message).await.context("smtp send")?;
        info!(kind = ?kind, "email sent");
        Ok(())
    }
}
