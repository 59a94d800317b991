//! Mail transports.
//!
//! The mailer renders messages; a [`MailTransport`] delivers them. Real
//! delivery (SMTP, an HTTP API) lives in the host application.

use crate::{error::MailerError, logger::Logger, message::Email};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outcome of a successful hand-off to a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub email_id: Uuid,
    /// Transport-specific message ID
    pub message_id: String,
    pub sent_at: chrono::DateTime<chrono::Utc>,
    pub transport: String,
}

impl DeliveryReceipt {
    pub fn new(email: &Email, transport: &str) -> Self {
        Self {
            email_id: email.id,
            message_id: format!("{}-{}", transport, Uuid::new_v4()),
            sent_at: chrono::Utc::now(),
            transport: transport.to_string(),
        }
    }
}

/// Delivers rendered messages
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<DeliveryReceipt, MailerError>;

    fn name(&self) -> &str;

    /// Whether mail actually leaves the process
    fn delivers(&self) -> bool {
        true
    }
}

/// Writes messages to the log instead of sending them
pub struct LogTransport {
    logger: Arc<dyn Logger>,
}

impl LogTransport {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &Email) -> Result<DeliveryReceipt, MailerError> {
        let mut lines = vec![
            format!("From: {}", email.from),
            format!("To: {}", email.to.join(", ")),
        ];
        if !email.cc.is_empty() {
            lines.push(format!("Cc: {}", email.cc.join(", ")));
        }
        if !email.bcc.is_empty() {
            lines.push(format!("Bcc: {}", email.bcc.join(", ")));
        }
        if let Some(reply_to) = &email.reply_to {
            lines.push(format!("Reply-To: {}", reply_to));
        }
        lines.push(format!("Subject: {}", email.subject));
        for attachment in &email.attachments {
            lines.push(format!(
                "Attachment: {} ({}, {} bytes)",
                attachment.filename,
                attachment.content_type,
                attachment.size()
            ));
        }
        if let Some(text) = email.text_body.as_ref().or(email.html_body.as_ref()) {
            lines.push(String::new());
            lines.push(text.clone());
        }

        self.logger.info(&lines.join("\n"));
        Ok(DeliveryReceipt::new(email, self.name()))
    }

    fn name(&self) -> &str {
        "log"
    }

    fn delivers(&self) -> bool {
        false
    }
}

/// Keeps sent messages in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<Email>>,
    fail_with: Option<String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every message with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    /// Messages accepted so far, oldest first
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Email> {
        self.sent.lock().ok()?.last().cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, email: &Email) -> Result<DeliveryReceipt, MailerError> {
        if let Some(message) = &self.fail_with {
            return Err(MailerError::transport(self.name(), message.clone()));
        }

        self.sent
            .lock()
            .map_err(|_| MailerError::transport(self.name(), "sent list lock poisoned"))?
            .push(email.clone());

        Ok(DeliveryReceipt::new(email, self.name()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{logger::RecordingLogger, message::Attachment};

    fn email() -> Email {
        Email::new()
            .from("app@example.com")
            .to("paul@example.com")
            .subject("Hello")
            .text_body("Hi Paul")
    }

    #[tokio::test]
    async fn test_memory_transport_keeps_messages() {
        let transport = MemoryTransport::new();
        let email = email();

        let receipt = transport.send(&email).await.unwrap();
        assert_eq!(receipt.email_id, email.id);
        assert_eq!(receipt.transport, "memory");
        assert!(receipt.message_id.starts_with("memory-"));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.last().unwrap().subject, "Hello");

        transport.clear();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let transport = MemoryTransport::failing("connection refused");
        let err = transport.send(&email()).await.unwrap_err();

        assert!(matches!(err, MailerError::Transport { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_log_transport_prints_message() {
        let logger = Arc::new(RecordingLogger::new());
        let transport = LogTransport::new(logger.clone());

        transport
            .send(&email().attach(Attachment::new("terms.pdf", vec![0; 12])))
            .await
            .unwrap();

        assert!(!transport.delivers());
        let lines = logger.messages(crate::logger::LogLevel::Info);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("To: paul@example.com"));
        assert!(lines[0].contains("Subject: Hello"));
        assert!(lines[0].contains("Hi Paul"));
        assert!(lines[0].contains("Attachment: terms.pdf (application/pdf, 12 bytes)"));
    }
}
