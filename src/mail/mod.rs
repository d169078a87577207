use async_trait::async_trait;
use tracing::info;

mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

/// Which single-use token an outgoing email carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verify,
    Reset,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, kind: MailKind, link: &str) -> anyhow::Result<()>;
}

/// Writes the link to the log instead of sending it. Used when no SMTP relay
/// is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, kind: MailKind, link: &str) -> anyhow::Result<()> {
        let email = templates::render(kind, link);
        info!(%to, subject = %email.subject, %link, "mail delivery disabled; logging link");
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMail {
        pub to: String,
        pub kind: MailKind,
        pub link: String,
    }

    impl SentMail {
        pub fn token(&self) -> &str {
            self.link.rsplit("token=").next().unwrap_or_default()
        }
    }

    /// Keeps every message in memory; can be switched to fail.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<SentMail>>,
        failing: AtomicBool,
    }

    impl RecordingMailer {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<SentMail> {
            self.sent.lock().unwrap().clone()
        }

        pub fn last(&self) -> Option<SentMail> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, kind: MailKind, link: &str) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("smtp relay unavailable");
            }
            self.sent.lock().unwrap().push(SentMail {
                to: to.into(),
                kind,
                link: link.into(),
            });
            Ok(())
        }
    }
}
