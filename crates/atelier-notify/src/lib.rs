//! Outbound email.
//!
//! Templates render plain data into [`EmailMessage`]; a [`Mailer`] delivers
//! it. Callers treat delivery as best effort: a failed send is logged and
//! never undoes the state change that triggered it.

pub mod templates;

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

pub use templates::Branding;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Request never got a response (DNS, TLS, timeout).
    Transport(String),
    /// Provider answered with a non-2xx status.
    Rejected { status: u16, body: String },
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::Transport(msg) => write!(f, "mail transport error: {msg}"),
            MailError::Rejected { status, body } => {
                write!(f, "mail provider rejected message status={status} body={body}")
            }
        }
    }
}

impl std::error::Error for MailError {}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, msg: &EmailMessage) -> Result<(), MailError>;
}

/// Sends through an HTTP email API (`POST {base_url}/emails`, bearer key).
///
/// The API key is passed in by the caller; it is never logged.
#[derive(Clone)]
pub struct HttpMailer {
    api_key: String,
    from: String,
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("api_key", &"REDACTED")
            .field("from", &self.from)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(api_key: String, from: String, base_url: String) -> Self {
        Self {
            api_key,
            from,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn emails_url(&self) -> String {
        format!("{}/emails", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, msg: &EmailMessage) -> Result<(), MailError> {
        let body = OutboundEmail {
            from: &self.from,
            to: [msg.to.as_str()],
            subject: &msg.subject,
            html: &msg.html,
            text: &msg.text,
        };
        let resp = self
            .http
            .post(self.emails_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(to = %msg.to, subject = %msg.subject, "email sent");
        Ok(())
    }
}

/// Development mailer: logs who would have received what.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, msg: &EmailMessage) -> Result<(), MailError> {
        info!(to = %msg.to, subject = %msg.subject, "email (not sent, log mailer)");
        Ok(())
    }
}

/// Keeps every message in memory. Test double.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Messages addressed to `to`, oldest first.
    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, msg: &EmailMessage) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(msg.clone());
        }
        Ok(())
    }
}
