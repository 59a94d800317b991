//! HTML to plain-text conversion for the text alternative of an email.

use crate::{config::PlainTextOptions, error::MailerError};
use regex::Regex;
use std::sync::OnceLock;

static IMAGE_TAG: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Convert `html` to plain text wrapped at `options.width`
pub fn to_text(html: &str, options: &PlainTextOptions) -> Result<String, MailerError> {
    if options.width == 0 {
        return Err(MailerError::conversion("width must be greater than 0"));
    }

    let source = if options.ignore_images {
        strip_images(html)?
    } else {
        html.to_string()
    };

    html2text::config::plain()
        .string_from_read(source.as_bytes(), options.width)
        .map_err(|e| MailerError::conversion(e.to_string()))
}

fn strip_images(html: &str) -> Result<String, MailerError> {
    let image = IMAGE_TAG
        .get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>"))
        .as_ref()
        .map_err(|e| MailerError::conversion(e.to_string()))?;
    Ok(image.replace_all(html, "").into_owned())
}
