//! Preview and test-send routes.
//!
//! For every template with a route, three GET routes are registered through
//! a [`RouteRegistrar`]:
//!
//! - `/{prefix}/preview{path}` renders the HTML
//! - `/{prefix}/text{path}` renders the plain-text version
//! - `/{prefix}/send{path}?to=&cc=&bcc=` sends a test email
//!
//! The registrar is supplied by the host application, so this module does not
//! depend on any particular router.

use crate::{
    error::MailerError,
    mailer::{Mailer, Middleware},
    sender::{split_addresses, SendOptions},
    templates::{capitalize_first, TemplateDescriptor},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

pub const HTML: &str = "text/html; charset=utf-8";
pub const PLAIN: &str = "text/plain; charset=utf-8";

/// Incoming request, already split into path parameters and query
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RouteRequest {
    /// Raw query value; present but empty is still `Some("")`
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// Response produced by a route handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl RouteResponse {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self::new(200, content_type, body)
    }

    /// Plain-text error body
    pub fn error(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, PLAIN, body)
    }
}

/// Handles GET requests for one route
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: RouteRequest) -> RouteResponse;
}

/// Route registration capability of the host router
pub trait RouteRegistrar {
    /// Register a GET route; `:name` segments of `path` are parameters
    fn get(&mut self, path: String, handler: Arc<dyn RouteHandler>);
}

/// The three route types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Preview,
    Text,
    Send,
}

impl RouteKind {
    pub const ALL: [RouteKind; 3] = [RouteKind::Preview, RouteKind::Text, RouteKind::Send];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Preview => "preview",
            RouteKind::Text => "text",
            RouteKind::Send => "send",
        }
    }
}

/// Full path of a route of `kind` for `template_path`
pub fn route_path(prefix: &str, kind: RouteKind, template_path: &str) -> String {
    format!("/{}/{}{}", prefix, kind.as_str(), template_path)
}

fn route_data(
    template: &TemplateDescriptor,
    request: &RouteRequest,
) -> Result<Value, MailerError> {
    let data = template.route.as_ref().and_then(|route| route.data.as_ref());
    match data {
        Some(f) => f(&request.params).map_err(|e| {
            MailerError::render(
                &template.name,
                format!("Exception in {} data function: {}", template.name, e),
            )
        }),
        None => Ok(Value::Null),
    }
}

fn data_error_message(error: &MailerError) -> String {
    match error {
        MailerError::Render { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Renders a template as HTML or plain text for the browser
pub struct PreviewHandler {
    mailer: Arc<Mailer>,
    template: Arc<TemplateDescriptor>,
    as_text: bool,
}

impl PreviewHandler {
    pub fn html(mailer: Arc<Mailer>, template: Arc<TemplateDescriptor>) -> Self {
        Self {
            mailer,
            template,
            as_text: false,
        }
    }

    pub fn text(mailer: Arc<Mailer>, template: Arc<TemplateDescriptor>) -> Self {
        Self {
            mailer,
            template,
            as_text: true,
        }
    }

    fn preview(&self, data: &Value) -> Result<String, MailerError> {
        // Pick up markup and stylesheet changes on every preview.
        self.mailer.recompile(&self.template.name)?;

        let html = self.mailer.render(&self.template.name, Some(data))?;
        if self.as_text {
            self.mailer.to_text(&html)
        } else {
            Ok(html)
        }
    }
}

#[async_trait]
impl RouteHandler for PreviewHandler {
    async fn handle(&self, request: RouteRequest) -> RouteResponse {
        let logger = self.mailer.logger();

        let data = match route_data(&self.template, &request) {
            Ok(data) => data,
            Err(e) => {
                let message = data_error_message(&e);
                logger.error(&message);
                return RouteResponse::error(500, message);
            }
        };

        let format = if self.as_text { "text" } else { "html" };
        logger.info(&format!("Rendering {} as {}...", self.template.name, format));

        match self.preview(&data) {
            Ok(content) => {
                logger.info("Rendering successful!");
                RouteResponse::ok(if self.as_text { PLAIN } else { HTML }, content)
            }
            Err(e) => {
                let message = format!("Could not preview email: {}", e);
                logger.error(&message);
                RouteResponse::error(500, message)
            }
        }
    }
}

/// Sends a test email rendered from a template
pub struct SendHandler {
    mailer: Arc<Mailer>,
    template: Arc<TemplateDescriptor>,
}

impl SendHandler {
    pub fn new(mailer: Arc<Mailer>, template: Arc<TemplateDescriptor>) -> Self {
        Self { mailer, template }
    }
}

#[async_trait]
impl RouteHandler for SendHandler {
    async fn handle(&self, request: RouteRequest) -> RouteResponse {
        let logger = self.mailer.logger();
        let config = self.mailer.config();

        // An empty `?to=` overrides the configured test address.
        let to = match request
            .query_value("to")
            .map(str::to_string)
            .or_else(|| config.test_email.clone())
        {
            Some(to) if !to.trim().is_empty() => to,
            _ => return RouteResponse::error(400, "No testEmail or ?to parameter provided."),
        };
        let cc = request.query_value("cc").filter(|cc| !cc.trim().is_empty());
        let bcc = request.query_value("bcc").filter(|bcc| !bcc.trim().is_empty());

        logger.info(&format!("Sending {}...", self.template.name));

        let data = match route_data(&self.template, &request) {
            Ok(data) => data,
            Err(e) => {
                let message = data_error_message(&e);
                logger.error(&message);
                return RouteResponse::error(500, message);
            }
        };

        let mut options = SendOptions::new(
            self.template.name.clone(),
            format!("[TEST] {}", self.template.name),
        )
        .to_many(split_addresses(&to))
        .data(data);
        if let Some(cc) = cc {
            options.cc = split_addresses(cc);
        }
        if let Some(bcc) = bcc {
            options.bcc = split_addresses(bcc);
        }

        let sent = match self.mailer.send(options).await {
            Ok(sent) => sent,
            Err(e) => {
                logger.error(&format!("Could not send test email: {}", e));
                false
            }
        };

        if !sent {
            return RouteResponse::error(
                500,
                "Did not send test email, something went wrong. Check the logs.",
            );
        }

        let message = if self.mailer.transport().delivers() && !config.disabled {
            let mut message = format!("Sent test email to {}", to);
            if let Some(cc) = cc {
                message.push_str(&format!(" and cc: {}", cc));
            }
            if let Some(bcc) = bcc {
                message.push_str(&format!(", and bcc: {}", bcc));
            }
            message
        } else {
            "Sent email to STDOUT".to_string()
        };

        logger.info(&message);
        RouteResponse::ok(PLAIN, message)
    }
}

/// Registers preview and send routes for every template with a route
pub struct RoutingMiddleware<R> {
    registrar: R,
    registered: Vec<String>,
}

impl<R: RouteRegistrar> RoutingMiddleware<R> {
    pub fn new(registrar: R) -> Self {
        Self {
            registrar,
            registered: Vec::new(),
        }
    }

    /// Paths registered so far
    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    pub fn into_registrar(self) -> R {
        self.registrar
    }
}

impl<R: RouteRegistrar> Middleware for RoutingMiddleware<R> {
    fn apply(
        &mut self,
        mailer: &Arc<Mailer>,
        template: &Arc<TemplateDescriptor>,
    ) -> Result<(), MailerError> {
        let Some(route) = &template.route else {
            mailer.logger().info(&format!(
                "Cannot set up route for '{}' mailer template - missing 'route' property.",
                template.name
            ));
            return Ok(());
        };

        let prefix = &mailer.config().route_prefix;
        for kind in RouteKind::ALL {
            let path = route_path(prefix, kind, &route.path);
            let handler: Arc<dyn RouteHandler> = match kind {
                RouteKind::Preview => Arc::new(PreviewHandler::html(mailer.clone(), template.clone())),
                RouteKind::Text => Arc::new(PreviewHandler::text(mailer.clone(), template.clone())),
                RouteKind::Send => Arc::new(SendHandler::new(mailer.clone(), template.clone())),
            };

            mailer.logger().info(&format!(
                "Add route: [{}{}] at path {}",
                kind.as_str(),
                capitalize_first(&template.name),
                path
            ));
            self.registrar.get(path.clone(), handler);
            self.registered.push(path);
        }

        Ok(())
    }
}
