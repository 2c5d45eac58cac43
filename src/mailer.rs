use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, to: &str, subject: &str, code: &str) -> anyhow::Result<()>;
}

/// SMTP relay when `SMTP_HOST` is set, the log otherwise.
pub fn from_config(smtp: &SmtpConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match smtp.host.as_deref() {
        Some(host) => Ok(Arc::new(SmtpMailer::new(host, smtp)?) as Arc<dyn Mailer>),
        None => Ok(Arc::new(LogMailer::new(smtp)) as Arc<dyn Mailer>),
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Port 465 uses implicit TLS; any other port upgrades with STARTTLS.
    pub fn new(host: &str, smtp: &SmtpConfig) -> anyhow::Result<Self> {
        let from: Mailbox = smtp
            .from
            .parse()
            .with_context(|| format!("invalid SMTP_FROM {:?}", smtp.from))?;

        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("smtp relay {host}"))?;

        let mut builder = builder.port(smtp.port);
        if let (Some(user), Some(pass)) = (&smtp.user, &smtp.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(smtp_host = %host, smtp_port = smtp.port, from = %from, "smtp mailer configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(&self, to: &str, subject: &str, code: &str) -> anyhow::Result<()> {
        let message = compose(&self.from, to, subject, code)?;
        self.transport.send(message).await.context("smtp send")?;
        info!(%to, %subject, "one-time code mailed");
        Ok(())
    }
}

fn compose(from: &Mailbox, to: &str, subject: &str, code: &str) -> anyhow::Result<Message> {
    let to: Mailbox = to
        .parse()
        .with_context(|| format!("invalid recipient {to:?}"))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(
            format!("Your verification code is: {code}"),
            format!("<p>Your verification code is: <b>{code}</b></p>"),
        ))
        .context("build message")
}

/// Writes outgoing codes to the log instead of a mail relay.
#[derive(Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(smtp: &SmtpConfig) -> Self {
        info!(
            from = %smtp.from,
            "SMTP_HOST not set; one-time codes are written to the log"
        );
        Self {
            from: smtp.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, to: &str, subject: &str, code: &str) -> anyhow::Result<()> {
        info!(from = %self.from, %to, %subject, %code, "one-time code issued");
        Ok(())
    }
}

/// Best-effort delivery: failures are logged and never reach the caller.
pub async fn deliver_code(mailer: &dyn Mailer, to: &str, subject: &str, code: &str) {
    if let Err(e) = mailer.send_code(to, subject, code).await {
        warn!(error = %format!("{e:#}"), %to, %code, "failed to send email; code is still valid");
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentCode {
        pub to: String,
        pub subject: String,
        pub code: String,
    }

    /// Records every message; optionally fails after recording.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<SentCode>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn last_code_for(&self, to: &str) -> Option<String> {
            let sent = self.sent.lock().expect("mailer mutex poisoned");
            sent.iter().rev().find(|m| m.to == to).map(|m| m.code.clone())
        }

        pub fn count(&self) -> usize {
            self.sent.lock().expect("mailer mutex poisoned").len()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_code(&self, to: &str, subject: &str, code: &str) -> anyhow::Result<()> {
            self.sent.lock().expect("mailer mutex poisoned").push(SentCode {
                to: to.into(),
                subject: subject.into(),
                code: code.into(),
            });
            if self.fail {
                anyhow::bail!("relay refused connection");
            }
            Ok(())
        }
    }
}
