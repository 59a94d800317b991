use thiserror::Error;

/// Mailer errors
///
/// Everything raised inside one template's pipeline is reported through this
/// type; callers decide whether a variant is fatal for them.
#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Could not find file: {path} ({message})")]
    SourceUnavailable { path: String, message: String },

    #[error("Could not find template: {name}")]
    TemplateNotFound { name: String },

    #[error("Template syntax error in {template}: {message}")]
    Syntax { template: String, message: String },

    #[error("Render error in {template}: {message}")]
    Render { template: String, message: String },

    #[error("Inline error: {message}")]
    Inline { message: String },

    #[error("Stylesheet error: {path} - {message}")]
    Stylesheet { path: String, message: String },

    #[error("Conversion error: {message}")]
    Conversion { message: String },

    #[error("Transport error: {transport} - {message}")]
    Transport { transport: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl MailerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source_unavailable(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }

    pub fn render(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            template: template.into(),
            message: message.into(),
        }
    }

    pub fn inline(message: impl Into<String>) -> Self {
        Self::Inline {
            message: message.into(),
        }
    }

    pub fn stylesheet(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stylesheet {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn transport(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            transport: transport.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error belongs to the caller (bad options or descriptors)
    /// rather than to a single render.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<serde_json::Error> for MailerError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation("data", err.to_string())
    }
}

impl From<css_inline::InlineError> for MailerError {
    fn from(err: css_inline::InlineError) -> Self {
        Self::inline(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MailerError::template_not_found("welcome");
        assert_eq!(err.to_string(), "Could not find template: welcome");

        let err = MailerError::render("welcome", "helper 'boom' failed");
        assert_eq!(
            err.to_string(),
            "Render error in welcome: helper 'boom' failed"
        );
        assert!(!err.is_validation());
        assert!(MailerError::validation("to", "missing").is_validation());
    }
}
