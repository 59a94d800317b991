use crate::error::MailerError;
use serde::{Deserialize, Serialize};
use std::env;

/// Mailer configuration
///
/// Built once at startup and shared by reference with every component that
/// needs it. Later changes require building a new mailer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Default sender, used when send options carry no `from`
    pub from: Option<String>,
    /// Default reply-to address
    pub reply_to: Option<String>,
    /// Top level path segment for preview and send routes
    pub route_prefix: String,
    /// Root URL that relative paths in templates are resolved against
    pub base_url: String,
    /// Recipient for test sends when the request names none
    pub test_email: Option<String>,
    /// Render and validate but never hand messages to the transport
    pub disabled: bool,
    /// Register preview and send routes
    pub add_routes: bool,
    /// Suppress info level log lines
    pub silent: bool,
    /// Attach a plain-text body derived from the HTML when sending
    pub plain_text: bool,
    /// Plain-text conversion policy
    pub plain_text_opts: PlainTextOptions,
    /// Stylesheet inlining policy
    pub inline_opts: InlineOptions,
}

/// HTML to plain-text conversion policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlainTextOptions {
    /// Line width to wrap at
    pub width: usize,
    /// Drop `<img>` elements instead of rendering their alt text
    pub ignore_images: bool,
}

/// Stylesheet inlining policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineOptions {
    /// Keep at-rules such as `@media` in a `<style>` block
    pub preserve_media_queries: bool,
    /// Remove `<style>` tags once their rules are inlined
    pub remove_style_tags: bool,
    /// Fetch remote stylesheets and images referenced by the document
    pub load_remote_resources: bool,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            from: None,
            reply_to: None,
            route_prefix: "emails".to_string(),
            base_url: "http://localhost:3000".to_string(),
            test_email: None,
            disabled: false,
            add_routes: false,
            silent: false,
            plain_text: true,
            plain_text_opts: PlainTextOptions::default(),
            inline_opts: InlineOptions::default(),
        }
    }
}

impl Default for PlainTextOptions {
    fn default() -> Self {
        Self {
            width: 80,
            ignore_images: false,
        }
    }
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            preserve_media_queries: true,
            remove_style_tags: true,
            load_remote_resources: false,
        }
    }
}

impl MailerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, MailerError> {
        let defaults = Self::default();

        let config = Self {
            from: env_opt("MAIL_FROM"),
            reply_to: env_opt("MAIL_REPLY_TO"),
            route_prefix: get_env_or_default("MAILER_ROUTE_PREFIX", &defaults.route_prefix),
            base_url: get_env_or_default("ROOT_URL", &defaults.base_url),
            test_email: env_opt("MAILER_TEST_EMAIL"),
            disabled: env_bool("MAILER_DISABLED", defaults.disabled)?,
            add_routes: env_bool("MAILER_ADD_ROUTES", defaults.add_routes)?,
            silent: env_bool("MAILER_SILENT", defaults.silent)?,
            plain_text: env_bool("MAILER_PLAIN_TEXT", defaults.plain_text)?,
            plain_text_opts: defaults.plain_text_opts,
            inline_opts: defaults.inline_opts,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check settings that would otherwise fail late, at route or render time
    pub fn validate(&self) -> Result<(), MailerError> {
        if self.route_prefix.trim().is_empty() {
            return Err(MailerError::validation(
                "route_prefix",
                "Route prefix cannot be empty",
            ));
        }

        if self.route_prefix.contains('/') {
            return Err(MailerError::validation(
                "route_prefix",
                format!("Route prefix '{}' must be a single path segment", self.route_prefix),
            ));
        }

        url::Url::parse(&self.base_url).map_err(|e| {
            MailerError::validation("base_url", format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;

        if self.plain_text_opts.width == 0 {
            return Err(MailerError::validation(
                "plain_text_opts.width",
                "Plain-text width must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_test_email(mut self, test_email: impl Into<String>) -> Self {
        self.test_email = Some(test_email.into());
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_add_routes(mut self, add_routes: bool) -> Self {
        self.add_routes = add_routes;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_plain_text(mut self, plain_text: bool) -> Self {
        self.plain_text = plain_text;
        self
    }

    pub fn with_plain_text_opts(mut self, opts: PlainTextOptions) -> Self {
        self.plain_text_opts = opts;
        self
    }

    pub fn with_inline_opts(mut self, opts: InlineOptions) -> Self {
        self.inline_opts = opts;
        self
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> Result<bool, MailerError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(MailerError::configuration(format!(
                "{} must be true or false, got '{}'",
                key, value
            ))),
        },
        Err(_) => Ok(default),
    }
}
