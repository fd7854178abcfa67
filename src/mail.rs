//! Outbound notification sink.
//!
//! Broadcast starts notify registered participants through a [`Mailer`].
//! Delivery failures are reported to the caller, which logs and swallows
//! them: a broadcast never fails because mail did.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError>;
}

/// Writes every notification to the log. The default backend.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        info!(recipients = to.len(), subject = %subject, body_len = body.len(), "mail (log backend)");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

/// POSTs notifications as JSON to a delivery service.
pub struct WebhookMailer {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(concat!("huddle/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookPayload { to, subject, body })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MailError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// A sent notification, as captured by [`RecordingMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Test double capturing sent mail, optionally failing every send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl RecordingMailer {
    /// A mailer whose every send fails with a 503.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Status(503));
        }
        self.sent.lock().push(SentMail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
