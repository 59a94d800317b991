use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A fully rendered email, ready for a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Unique identifier for tracking
    pub id: Uuid,
    /// Sender email address
    pub from: String,
    /// Recipient email addresses
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    /// HTML body content
    pub html_body: Option<String>,
    /// Plain text body content
    pub text_body: Option<String>,
    pub attachments: Vec<Attachment>,
    pub headers: HashMap<String, String>,
}

/// Email attachment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub filename: String,
    /// MIME content type
    pub content_type: String,
    pub content: Vec<u8>,
    /// Content ID for attachments embedded in the HTML body
    pub content_id: Option<String>,
    pub disposition: AttachmentDisposition,
}

/// Attachment disposition type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum AttachmentDisposition {
    /// Regular file attachment
    #[default]
    Attachment,
    /// Inline attachment (e.g., embedded image)
    Inline,
}

impl Email {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            from: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: None,
            subject: String::new(),
            html_body: None,
            text_body: None,
            attachments: Vec::new(),
            headers: HashMap::new(),
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Add recipient
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

impl Default for Email {
    fn default() -> Self {
        Self::new()
    }
}

impl Attachment {
    /// Create a new attachment with automatic MIME type detection
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Self {
            filename,
            content_type,
            content,
            content_id: None,
            disposition: AttachmentDisposition::Attachment,
        }
    }

    /// Create an attachment embedded in the HTML as `cid:<content_id>`
    pub fn inline(
        filename: impl Into<String>,
        content: Vec<u8>,
        content_id: impl Into<String>,
    ) -> Self {
        let mut attachment = Self::new(filename, content);
        attachment.disposition = AttachmentDisposition::Inline;
        attachment.content_id = Some(content_id.into());
        attachment
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_builder() {
        let mut email = Email::new()
            .from("app@example.com")
            .to("paul@example.com")
            .subject("Hello")
            .html_body("<p>Hi</p>");
        email.bcc.push("audit@example.com".into());

        assert_eq!(email.to, vec!["paul@example.com"]);
        assert_eq!(email.bcc, vec!["audit@example.com"]);
    }

    #[test]
    fn test_attachment_mime_type() {
        let pdf = Attachment::new("invoice.pdf", vec![1, 2, 3]);
        assert_eq!(pdf.content_type, "application/pdf");
        assert_eq!(pdf.size(), 3);

        let unknown = Attachment::new("blob", vec![]);
        assert_eq!(unknown.content_type, "application/octet-stream");

        let logo = Attachment::inline("logo.png", vec![0], "logo");
        assert_eq!(logo.content_type, "image/png");
        assert_eq!(logo.disposition, AttachmentDisposition::Inline);
        assert_eq!(logo.content_id.as_deref(), Some("logo"));
    }
}
