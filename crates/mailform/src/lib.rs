//! # mailform
//!
//! Email templates for Rust applications: handlebars markup, shared layouts,
//! inlined stylesheets and plain-text alternatives, with preview and
//! test-send routes for development.
//!
//! ## Features
//!
//! - Named templates with per-template, global and built-in helpers
//! - Layouts compiled once and shared by every template that uses them
//! - CSS and SCSS stylesheets inlined into `style` attributes, media
//!   queries preserved
//! - Plain-text bodies derived from the rendered HTML
//! - Sending through a pluggable [`MailTransport`]
//! - Router-agnostic preview routes (see the `mailform-http` crate for axum)

pub mod config;
pub mod error;
pub mod inliner;
pub mod logger;
pub mod mailer;
pub mod message;
pub mod routing;
pub mod sender;
pub mod source;
pub mod templates;
pub mod text;
pub mod transport;

pub use config::*;
pub use error::*;
pub use inliner::StylesheetInliner;
pub use logger::{Logger, RecordingLogger, TracingLogger};
pub use mailer::*;
pub use message::*;
pub use routing::{RouteHandler, RouteRegistrar, RouteRequest, RouteResponse, RoutingMiddleware};
pub use sender::*;
pub use source::*;
pub use templates::*;
pub use transport::*;
