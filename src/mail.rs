//! Outgoing email.
//!
//! Production delivers over SMTP with lettre. Local development usually
//! writes messages to files instead, and tests collect them in memory.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, EmailBackend, SmtpConfig};

/// Prefix for subjects of mail sent to the site admins.
pub const SUBJECT_PREFIX: &str = "[MarkItDone] ";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message has no recipients")]
    NoRecipients,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Render the message the way the file and console backends store it.
    pub fn to_text(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}\n",
            self.from,
            self.to.join(", "),
            self.subject,
            Utc::now().to_rfc2822(),
            self.body
        )
    }

    fn to_lettre(&self) -> Result<Message, MailError> {
        if self.to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .subject(self.subject.clone());
        for to in &self.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }

        Ok(builder
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())?)
    }
}

/// Messages captured by the memory backend.
pub type Outbox = Arc<Mutex<Vec<EmailMessage>>>;

pub enum Mailer {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(PathBuf),
    Console,
    Memory(Outbox),
}

impl Mailer {
    pub fn from_config(backend: &EmailBackend) -> Result<Self, MailError> {
        Ok(match backend {
            EmailBackend::Smtp(smtp) => Self::Smtp(smtp_transport(smtp)?),
            EmailBackend::File(dir) => Self::File(dir.clone()),
            EmailBackend::Console => Self::Console,
            EmailBackend::Memory => Self::Memory(Outbox::default()),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "smtp",
            Self::File(_) => "file",
            Self::Console => "console",
            Self::Memory(_) => "memory",
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        match self {
            Self::Smtp(transport) => {
                transport.send(message.to_lettre()?).await?;
            }
            Self::File(dir) => {
                if message.to.is_empty() {
                    return Err(MailError::NoRecipients);
                }
                tokio::fs::create_dir_all(dir).await?;
                let name = format!(
                    "{}-{}.log",
                    Utc::now().format("%Y%m%d-%H%M%S"),
                    Uuid::new_v4().simple()
                );
                let content = format!("{}{}\n", message.to_text(), "-".repeat(79));
                tokio::fs::write(dir.join(name), content).await?;
            }
            Self::Console => {
                tracing::info!(
                    to = %message.to.join(", "),
                    subject = %message.subject,
                    "Email (console backend):\n{}",
                    message.to_text()
                );
            }
            Self::Memory(outbox) => {
                outbox
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(message.clone());
            }
        }

        tracing::debug!(
            backend = self.backend_name(),
            subject = %message.subject,
            recipients = message.to.len(),
            "Email sent"
        );
        Ok(())
    }
}

fn smtp_transport(smtp: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let builder = if smtp.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
    };

    let mut builder = builder.port(smtp.port);
    if !smtp.user.is_empty() {
        builder = builder.credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()));
    }

    Ok(builder.build())
}

/// A message to every configured admin, or `None` when there are none.
pub fn mail_admins(config: &Config, subject: &str, body: &str) -> Option<EmailMessage> {
    if config.admins.is_empty() {
        return None;
    }

    Some(EmailMessage {
        from: config.default_from_email.clone(),
        to: config.admins.clone(),
        subject: format!("{}{}", SUBJECT_PREFIX, subject),
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "webmaster@markitdone.com".into(),
            to: vec!["Jane <jane@example.com>".into()],
            subject: "Activate your account".into(),
            body: "Follow the link.".into(),
        }
    }

    #[tokio::test]
    async fn file_backend_writes_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("emails");
        let mailer = Mailer::File(target.clone());

        mailer.send(&message()).await.unwrap();
        mailer.send(&message()).await.unwrap();

        let files: Vec<_> = fs::read_dir(&target).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(files.len(), 2);

        let content = fs::read_to_string(files[0].path()).unwrap();
        assert!(content.contains("To: Jane <jane@example.com>"));
        assert!(content.contains("Subject: Activate your account"));
        assert!(content.contains("Follow the link."));
        assert!(files[0].file_name().to_string_lossy().ends_with(".log"));
    }

    #[tokio::test]
    async fn memory_backend_collects_messages() {
        let outbox = Outbox::default();
        let mailer = Mailer::Memory(outbox.clone());
        mailer.send(&message()).await.unwrap();
        assert_eq!(outbox.lock().unwrap().as_slice(), &[message()]);
    }

    #[tokio::test]
    async fn file_backend_rejects_messages_without_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = Mailer::File(dir.path().to_path_buf());
        let mut msg = message();
        msg.to.clear();
        assert!(matches!(mailer.send(&msg).await, Err(MailError::NoRecipients)));
    }

    #[test]
    fn lettre_message_requires_valid_addresses() {
        assert!(message().to_lettre().is_ok());
        let mut msg = message();
        msg.to = vec!["not an address".into()];
        assert!(matches!(msg.to_lettre(), Err(MailError::Address(_))));
    }

    #[test]
    fn mail_admins_prefixes_subject_and_skips_without_admins() {
        let mut config = Config::default();
        assert!(mail_admins(&config, "ERROR", "boom").is_none());

        config.admins = vec!["Ops <ops@example.com>".into()];
        let msg = mail_admins(&config, "ERROR: GET /", "boom").unwrap();
        assert_eq!(msg.subject, "[MarkItDone] ERROR: GET /");
        assert_eq!(msg.to, vec!["Ops <ops@example.com>".to_string()]);
        assert_eq!(msg.from, "webmaster@markitdone.com");
    }
}
