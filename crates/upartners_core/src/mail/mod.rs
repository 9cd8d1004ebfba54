//! Outbound notification email.
//!
//! Messages are rendered from a small set of built-in templates and handed
//! to a [`Mailer`]. The shipped [`OutboxMailer`] writes one `.eml` file per
//! message into a spool directory for the system MTA to pick up.

use chrono::Utc;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EMAIL_SIGNATURE: &str = "The U-Partners team";

pub type MailResult<T> = Result<T, MailError>;

#[derive(Debug)]
pub enum MailError {
    InvalidRecipient(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for MailError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRecipient(value) => write!(f, "invalid email recipient `{value}`"),
            Self::Io { path, source } => {
                write!(f, "cannot write email to `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for MailError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidRecipient(_) => None,
        }
    }
}

/// Built-in email templates and their context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    MessageExport { link: String },
}

impl EmailTemplate {
    pub fn render(&self) -> String {
        match self {
            Self::MessageExport { link } => format!(
                "Hi,\n\nYour messages export is ready. You can download it here:\n\n{link}\n\n{EMAIL_SIGNATURE}\n"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn from_template(to: &str, subject: &str, template: &EmailTemplate) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body: template.render(),
        }
    }
}

pub trait Mailer {
    fn send(&self, email: &OutgoingEmail) -> MailResult<()>;
}

/// Spools messages as `.eml` files into a directory.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
    from: String,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>, from: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            from: from.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &OutgoingEmail) -> MailResult<()> {
        let to = email.to.trim();
        if to.is_empty() || !to.contains('@') || to.contains(['\r', '\n']) {
            return Err(MailError::InvalidRecipient(email.to.clone()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| MailError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let now = Utc::now();
        let path = self
            .dir
            .join(format!("{}-{}.eml", now.format("%Y%m%d%H%M%S"), Uuid::new_v4().simple()));
        let subject = email.subject.replace(['\r', '\n'], " ");
        let message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            self.from,
            to,
            subject,
            now.to_rfc2822(),
            email.body
        );
        std::fs::write(&path, message).map_err(|source| MailError::Io {
            path: path.clone(),
            source,
        })?;
        info!("event=email_spooled module=mail status=ok");
        Ok(())
    }
}
