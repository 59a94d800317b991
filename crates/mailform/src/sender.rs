use crate::{
    config::MailerConfig,
    error::MailerError,
    message::{Attachment, Email},
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Longest subject line allowed by RFC 5322
pub const MAX_SUBJECT_LENGTH: usize = 998;

/// What to send: recipients, subject, and the template to render
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub from: Option<String>,
    pub subject: String,
    /// Name of the template to render
    pub template: String,
    /// Render data
    pub data: Value,
    pub headers: HashMap<String, String>,
    pub attachments: Vec<Attachment>,
}

impl SendOptions {
    pub fn new(template: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Add recipient
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    pub fn to_many<I, S>(mut self, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to.extend(to.into_iter().map(Into::into));
        self
    }

    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc.push(cc.into());
        self
    }

    pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc.push(bcc.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Use any serializable value as render data
    pub fn data_from<T: Serialize>(mut self, data: &T) -> Result<Self, MailerError> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Check the options and resolve the sender
    ///
    /// Returns the `from` address to use, falling back to the configured one.
    pub fn validate(&self, config: &MailerConfig) -> Result<String, MailerError> {
        if self.to.is_empty() {
            return Err(MailerError::validation("to", "At least one recipient is required"));
        }

        for (field, list) in [("to", &self.to), ("cc", &self.cc), ("bcc", &self.bcc)] {
            if list.iter().any(|address| address.trim().is_empty()) {
                return Err(MailerError::validation(field, "Recipient address cannot be empty"));
            }
        }

        if self.subject.trim().is_empty() {
            return Err(MailerError::validation("subject", "Subject cannot be empty"));
        }

        if self.subject.chars().count() > MAX_SUBJECT_LENGTH {
            return Err(MailerError::validation(
                "subject",
                format!("Subject cannot be longer than {} characters", MAX_SUBJECT_LENGTH),
            ));
        }

        if self.template.trim().is_empty() {
            return Err(MailerError::validation("template", "Template name cannot be empty"));
        }

        self.from
            .as_ref()
            .or(config.from.as_ref())
            .filter(|from| !from.trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                MailerError::validation("from", "No sender given and no default configured")
            })
    }

    /// Build the message for the transport; `template` and `data` stay behind
    pub fn into_email(
        self,
        from: String,
        default_reply_to: Option<&str>,
        html: String,
        text: Option<String>,
    ) -> Email {
        let mut email = Email::new().from(from).subject(self.subject).html_body(html);
        email.to = self.to;
        email.cc = self.cc;
        email.bcc = self.bcc;
        email.reply_to = self.reply_to.or_else(|| default_reply_to.map(str::to_string));
        email.text_body = text;
        email.headers = self.headers;
        email.attachments = self.attachments;
        email
    }
}

/// Split a comma separated address list, dropping blanks
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> MailerConfig {
        MailerConfig::default().with_from("app@example.com")
    }

    #[test]
    fn test_validate_resolves_from() {
        let options = SendOptions::new("welcome", "Hello").to("paul@example.com");
        assert_eq!(options.validate(&config()).unwrap(), "app@example.com");

        let options = options.from("ringo@example.com");
        assert_eq!(options.validate(&config()).unwrap(), "ringo@example.com");

        let options = SendOptions::new("welcome", "Hello").to("paul@example.com");
        let err = options.validate(&MailerConfig::default()).unwrap_err();
        assert!(matches!(err, MailerError::Validation { ref field, .. } if field == "from"));
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let config = config();

        assert!(SendOptions::new("welcome", "Hello").validate(&config).is_err());
        assert!(SendOptions::new("welcome", "Hello")
            .to(" ")
            .validate(&config)
            .is_err());
        assert!(SendOptions::new("welcome", "Hello")
            .to("a@example.com")
            .cc("")
            .validate(&config)
            .is_err());
        assert!(SendOptions::new("welcome", "")
            .to("a@example.com")
            .validate(&config)
            .is_err());
        assert!(SendOptions::new("", "Hello")
            .to("a@example.com")
            .validate(&config)
            .is_err());
        assert!(SendOptions::new("welcome", "x".repeat(MAX_SUBJECT_LENGTH + 1))
            .to("a@example.com")
            .validate(&config)
            .is_err());
    }

    #[test]
    fn test_into_email_drops_render_fields() {
        let email = SendOptions::new("welcome", "Hello")
            .to("paul@example.com")
            .bcc("audit@example.com")
            .data(json!({"name": "Paul"}))
            .header("X-Campaign", "launch")
            .into_email(
                "app@example.com".into(),
                Some("support@example.com"),
                "<p>Hi</p>".into(),
                Some("Hi".into()),
            );

        assert_eq!(email.from, "app@example.com");
        assert_eq!(email.reply_to.as_deref(), Some("support@example.com"));
        assert_eq!(email.bcc, vec!["audit@example.com"]);
        assert_eq!(email.text_body.as_deref(), Some("Hi"));
        assert_eq!(email.headers.get("X-Campaign").map(String::as_str), Some("launch"));
    }

    #[test]
    fn test_split_addresses() {
        assert_eq!(
            split_addresses("a@example.com, b@example.com,,"),
            vec!["a@example.com", "b@example.com"]
        );
        assert!(split_addresses(" ").is_empty());
    }
}
