//! The mailer: template registry, compiler and render pipeline behind one
//! facade, plus sending through a [`MailTransport`].

use crate::{
    config::MailerConfig,
    error::MailerError,
    inliner::StylesheetInliner,
    logger::{with_silence, Logger, TracingLogger},
    sender::SendOptions,
    source::{FileResolver, FsResolver},
    templates::{
        builtin_helpers, effective_layout, value_to_text, CompileStats, CompiledTemplate,
        HelperCall, HelperTable, LayoutDescriptor, NamedRoutes, TemplateCompiler,
        TemplateDescriptor, TemplateRegistry,
    },
    text,
    transport::{LogTransport, MailTransport},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Prepended to every rendered email
pub const DOCTYPE: &str = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n";

/// Runs once per registered template after the mailer is built
pub trait Middleware {
    fn apply(
        &mut self,
        mailer: &Arc<Mailer>,
        template: &Arc<TemplateDescriptor>,
    ) -> Result<(), MailerError>;
}

/// Result of precompiling every template at startup
#[derive(Debug, Default)]
pub struct InitReport {
    pub compiled: Vec<String>,
    pub failed: Vec<(String, MailerError)>,
}

impl InitReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Renders and sends email templates
pub struct Mailer {
    config: MailerConfig,
    logger: Arc<dyn Logger>,
    resolver: Arc<dyn FileResolver>,
    registry: TemplateRegistry,
    default_layout: Option<Arc<LayoutDescriptor>>,
    compiler: TemplateCompiler,
    inliner: StylesheetInliner,
    transport: Arc<dyn MailTransport>,
}

/// Builder for [`Mailer`]
pub struct MailerBuilder {
    config: MailerConfig,
    logger: Option<Arc<dyn Logger>>,
    resolver: Option<Arc<dyn FileResolver>>,
    templates: Vec<TemplateDescriptor>,
    helpers: HelperTable,
    host_helpers: HelperTable,
    layout: Option<LayoutDescriptor>,
    routes: NamedRoutes,
    transport: Option<Arc<dyn MailTransport>>,
}

impl MailerBuilder {
    fn new() -> Self {
        Self {
            config: MailerConfig::default(),
            logger: None,
            resolver: None,
            templates: Vec::new(),
            helpers: HelperTable::new(),
            host_helpers: HelperTable::new(),
            layout: None,
            routes: NamedRoutes::new(),
            transport: None,
        }
    }

    pub fn config(mut self, config: MailerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Where template, layout and stylesheet paths are read from
    pub fn resolver(mut self, resolver: Arc<dyn FileResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn template(mut self, template: TemplateDescriptor) -> Self {
        self.templates.push(template);
        self
    }

    pub fn templates(mut self, templates: impl IntoIterator<Item = TemplateDescriptor>) -> Self {
        self.templates.extend(templates);
        self
    }

    /// Add a helper available to every template
    pub fn helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.helpers.insert(name, crate::templates::helper(f));
        self
    }

    /// Add helpers available to every template
    pub fn helpers(mut self, helpers: HelperTable) -> Self {
        self.helpers = HelperTable::merge([&self.helpers, &helpers]);
        self
    }

    /// Helpers the host application exposes globally; below [`Self::helpers`]
    pub fn host_helpers(mut self, helpers: HelperTable) -> Self {
        self.host_helpers = HelperTable::merge([&self.host_helpers, &helpers]);
        self
    }

    /// Layout used by templates that do not pick their own
    pub fn layout(mut self, layout: LayoutDescriptor) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Register an application route for `emailUrlFor`, e.g. `/users/:id`
    pub fn named_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name, pattern);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Mailer, MailerError> {
        self.config.validate()?;

        let logger = with_silence(
            self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
            self.config.silent,
        );
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FsResolver::new(".")));

        let registry = TemplateRegistry::new();
        for template in self.templates {
            registry.register(template)?;
        }

        if let Some(layout) = &self.layout {
            if layout.name.trim().is_empty() {
                return Err(MailerError::validation("layout", "Layout name cannot be empty"));
            }
        }

        let builtins = builtin_helpers(&self.config.base_url, &self.routes, logger.clone());
        let compiler = TemplateCompiler::new(
            resolver.clone(),
            vec![builtins, self.host_helpers, self.helpers],
        );

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(LogTransport::new(logger.clone())));

        Ok(Mailer {
            inliner: StylesheetInliner::new(self.config.inline_opts.clone()),
            config: self.config,
            logger,
            resolver,
            registry,
            default_layout: self.layout.map(Arc::new),
            compiler,
            transport,
        })
    }
}

impl Mailer {
    pub fn builder() -> MailerBuilder {
        MailerBuilder::new()
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn transport(&self) -> &Arc<dyn MailTransport> {
        &self.transport
    }

    pub fn template(&self, name: &str) -> Result<Arc<TemplateDescriptor>, MailerError> {
        self.registry.get(name)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn compile_stats(&self) -> CompileStats {
        self.compiler.stats()
    }

    /// Compile every registered template
    ///
    /// A template that fails is logged and reported; the rest still compile.
    pub fn init(&self) -> InitReport {
        let mut report = InitReport::default();
        for name in self.registry.names() {
            match self.precompile(&name) {
                Ok(_) => report.compiled.push(name),
                Err(e) => report.failed.push((name, e)),
            }
        }
        debug!(
            "Mailer initialized: {} compiled, {} failed",
            report.compiled.len(),
            report.failed.len()
        );
        report
    }

    /// Run `middleware` over every registered template
    pub fn apply_middleware(
        self: &Arc<Self>,
        middleware: &mut dyn Middleware,
    ) -> Result<(), MailerError> {
        for template in self.registry.all() {
            middleware.apply(self, &template)?;
        }
        Ok(())
    }

    /// Compile a template, and its layout if that has not been compiled yet
    pub fn precompile(&self, name: &str) -> Result<Arc<CompiledTemplate>, MailerError> {
        self.compile_named(name, false)
    }

    /// Compile a template and its layout again from source
    pub fn recompile(&self, name: &str) -> Result<Arc<CompiledTemplate>, MailerError> {
        self.compile_named(name, true)
    }

    fn compile_named(&self, name: &str, refresh: bool) -> Result<Arc<CompiledTemplate>, MailerError> {
        let result = self.registry.get(name).and_then(|template| {
            let layout = effective_layout(&template, self.default_layout.as_ref());
            if refresh {
                self.compiler.recompile(&template, layout.as_deref())
            } else {
                self.compiler.compile(&template, layout.as_deref())
            }
        });

        result.map_err(|e| {
            self.logger
                .error(&format!("Could not compile template {}: {}", name, e));
            e
        })
    }

    /// Render a template to a complete HTML document
    ///
    /// Compiles on first use. Failures are logged with the template name.
    pub fn render(&self, name: &str, data: Option<&Value>) -> Result<String, MailerError> {
        self.render_inner(name, data).map_err(|e| {
            self.logger
                .error(&format!("Could not render template {}: {}", name, e));
            e
        })
    }

    /// Render with any serializable value as data
    pub fn render_with<T: Serialize>(&self, name: &str, data: &T) -> Result<String, MailerError> {
        let data = serde_json::to_value(data)?;
        self.render(name, Some(&data))
    }

    fn render_inner(&self, name: &str, data: Option<&Value>) -> Result<String, MailerError> {
        let template = self.registry.get(name)?;
        let layout = effective_layout(&template, self.default_layout.as_ref());

        let compiled = match self.compiler.get(name) {
            Some(compiled) => compiled,
            None => self.compiler.compile(&template, layout.as_deref())?,
        };

        let data = data.cloned().unwrap_or(Value::Null);
        let body = compiled.render(&data)?;

        let html = match layout {
            Some(layout) => {
                let preview = self.preview_for(&compiled, &data)?;
                let css = self.extra_css_for(&template);
                let context = layout_context(&data, body, css, preview);

                let compiled_layout = self.compiler.compile_layout(&layout, false)?;
                let html = compiled_layout.render(&context)?;
                let html = self.inliner.apply(
                    self.resolver.as_ref(),
                    self.logger.as_ref(),
                    &template.name,
                    html,
                    &template.stylesheets,
                );
                self.inliner.apply(
                    self.resolver.as_ref(),
                    self.logger.as_ref(),
                    &layout.name,
                    html,
                    &layout.stylesheets,
                )
            }
            None => self.inliner.apply(
                self.resolver.as_ref(),
                self.logger.as_ref(),
                &template.name,
                body,
                &template.stylesheets,
            ),
        };

        Ok(format!("{}{}", DOCTYPE, html))
    }

    /// The template's `preview` helper result, else `data.preview`, else null
    fn preview_for(&self, compiled: &CompiledTemplate, data: &Value) -> Result<Value, MailerError> {
        match compiled.helpers().call("preview", data) {
            Some(Ok(Value::Null)) => Ok(Value::Null),
            Some(Ok(value)) => Ok(Value::String(value_to_text(&value))),
            Some(Err(e)) => Err(MailerError::render(
                compiled.name(),
                format!("helper 'preview' failed: {:#}", e),
            )),
            None => Ok(data.get("preview").cloned().unwrap_or(Value::Null)),
        }
    }

    fn extra_css_for(&self, template: &TemplateDescriptor) -> Option<String> {
        let path = template.extra_css.as_ref()?;
        match self.resolver.read(path) {
            Ok(css) => Some(css),
            Err(e) => {
                self.logger.error(&format!(
                    "Could not add extra CSS when rendering {}: {}",
                    template.name, e
                ));
                None
            }
        }
    }

    /// Plain-text rendition of `html` using the configured options
    pub fn to_text(&self, html: &str) -> Result<String, MailerError> {
        text::to_text(html, &self.config.plain_text_opts).map_err(|e| {
            self.logger
                .error(&format!("Could not convert HTML to text: {}", e));
            e
        })
    }

    /// Render a template and hand it to the transport
    ///
    /// `Err` means the options were invalid. Render and transport failures
    /// are logged and reported as `Ok(false)`.
    pub async fn send(&self, options: SendOptions) -> Result<bool, MailerError> {
        let from = options.validate(&self.config)?;

        let html = match self.render(&options.template, Some(&options.data)) {
            Ok(html) => html,
            Err(e) => {
                self.logger
                    .error(&format!("Could not render email before sending: {}", e));
                return Ok(false);
            }
        };

        let text = if self.config.plain_text {
            match self.to_text(&html) {
                Ok(text) => Some(text),
                Err(e) => {
                    self.logger
                        .error(&format!("Could not render email before sending: {}", e));
                    return Ok(false);
                }
            }
        } else {
            None
        };

        let email = options.into_email(from, self.config.reply_to.as_deref(), html, text);

        if self.config.disabled {
            self.logger.info(&format!(
                "Sending is disabled, not sending \"{}\" to {}",
                email.subject,
                email.to.join(", ")
            ));
            return Ok(true);
        }

        match self.transport.send(&email).await {
            Ok(receipt) => {
                debug!(
                    "Sent email {} via {} as {}",
                    receipt.email_id, receipt.transport, receipt.message_id
                );
                Ok(true)
            }
            Err(e) => {
                self.logger.error(&format!("Could not send email: {}", e));
                Ok(false)
            }
        }
    }
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("templates", &self.registry.names())
            .field(
                "default_layout",
                &self.default_layout.as_ref().map(|l| l.name.as_str()),
            )
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Data for the layout: `data` with `body`, `css` and `preview` on top
///
/// Non-object data is kept under a `data` key.
fn layout_context(data: &Value, body: String, css: Option<String>, preview: Value) -> Value {
    let mut context = match data {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    };

    context.insert("body".to_string(), Value::String(body));
    context.insert("css".to_string(), css.map(Value::String).unwrap_or(Value::Null));
    context.insert("preview".to_string(), preview);
    Value::Object(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{logger::RecordingLogger, source::MemoryResolver, transport::MemoryTransport};
    use serde_json::json;

    fn layout() -> LayoutDescriptor {
        LayoutDescriptor::inline(
            "base",
            "<html><head><title>{{preview}}</title><style>{{{css}}}</style></head><body>{{{body}}}</body></html>",
        )
        .build()
    }

    #[test]
    fn test_layout_context_reserved_keys_win() {
        let data = json!({"name": "Paul", "body": "mine", "preview": "mine"});
        let context = layout_context(&data, "<p>x</p>".into(), None, json!("Hi"));

        assert_eq!(context["name"], "Paul");
        assert_eq!(context["body"], "<p>x</p>");
        assert_eq!(context["css"], Value::Null);
        assert_eq!(context["preview"], "Hi");

        let context = layout_context(&json!([1, 2]), String::new(), Some("p{}".into()), Value::Null);
        assert_eq!(context["data"], json!([1, 2]));
        assert_eq!(context["css"], "p{}");
    }

    #[test]
    fn test_render_without_layout() {
        let mailer = Mailer::builder()
            .template(TemplateDescriptor::inline("hi", "<p>Hi {{name}}</p>").build())
            .build()
            .unwrap();

        let html = mailer.render("hi", Some(&json!({"name": "Paul"}))).unwrap();
        assert_eq!(html, format!("{}<p>Hi Paul</p>", DOCTYPE));
    }

    #[test]
    fn test_preview_falls_back_to_data() {
        let mailer = Mailer::builder()
            .template(TemplateDescriptor::inline("hi", "<p>Hi</p>").build())
            .layout(layout())
            .build()
            .unwrap();

        let html = mailer
            .render("hi", Some(&json!({"preview": "From the data"})))
            .unwrap();
        assert!(html.contains("<title>From the data</title>"));

        let html = mailer.render("hi", None).unwrap();
        assert!(html.contains("<title></title>"));
    }

    #[test]
    fn test_extra_css_reaches_layout() {
        let resolver = MemoryResolver::new().with_file("media.css", "@media print { p { display: none; } }");
        let mailer = Mailer::builder()
            .resolver(Arc::new(resolver))
            .template(
                TemplateDescriptor::inline("hi", "<p>Hi</p>")
                    .extra_css("media.css")
                    .build(),
            )
            .layout(layout())
            .build()
            .unwrap();

        let html = mailer.render("hi", None).unwrap();
        assert!(html.contains("@media print"));
    }

    #[test]
    fn test_missing_extra_css_is_not_fatal() {
        let logger = Arc::new(RecordingLogger::new());
        let mailer = Mailer::builder()
            .logger(logger.clone())
            .resolver(Arc::new(MemoryResolver::new()))
            .template(
                TemplateDescriptor::inline("hi", "<p>Hi</p>")
                    .extra_css("gone.css")
                    .build(),
            )
            .layout(layout())
            .build()
            .unwrap();

        let html = mailer.render("hi", None).unwrap();
        assert!(html.contains("<p>Hi</p>"));
        assert_eq!(logger.errors().len(), 1);
        assert!(logger.errors()[0].starts_with("Could not add extra CSS when rendering hi"));
    }

    #[test]
    fn test_failing_helper_is_a_render_error() {
        let logger = Arc::new(RecordingLogger::new());
        let mailer = Mailer::builder()
            .logger(logger.clone())
            .template(
                TemplateDescriptor::inline("hi", "<p>{{boom}}</p>")
                    .helper("boom", |_| Err(anyhow::anyhow!("kaboom")))
                    .build(),
            )
            .build()
            .unwrap();

        let err = mailer.render("hi", None).unwrap_err();
        assert!(matches!(err, MailerError::Render { ref template, .. } if template == "hi"));
        assert!(logger.errors()[0].starts_with("Could not render template hi"));
    }

    #[test]
    fn test_silent_drops_info_lines() {
        let logger = Arc::new(RecordingLogger::new());
        let mailer = Mailer::builder()
            .config(MailerConfig::default().with_silent(true))
            .logger(logger.clone())
            .build()
            .unwrap();

        mailer.logger().info("hidden");
        mailer.logger().warn("shown");
        assert!(logger.messages(crate::logger::LogLevel::Info).is_empty());
        assert_eq!(logger.warnings(), vec!["shown"]);
    }

    #[test]
    fn test_duplicate_templates_rejected_at_build() {
        let result = Mailer::builder()
            .template(TemplateDescriptor::inline("hi", "a").build())
            .template(TemplateDescriptor::inline("hi", "b").build())
            .build();
        assert!(matches!(result, Err(MailerError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_disabled_skips_transport() {
        let transport = Arc::new(MemoryTransport::new());
        let mailer = Mailer::builder()
            .config(
                MailerConfig::default()
                    .with_from("app@example.com")
                    .with_disabled(true),
            )
            .template(TemplateDescriptor::inline("hi", "<p>Hi</p>").build())
            .transport(transport.clone())
            .build()
            .unwrap();

        let sent = mailer
            .send(SendOptions::new("hi", "Hello").to("paul@example.com"))
            .await
            .unwrap();

        assert!(sent);
        assert!(transport.sent().is_empty());
    }
}
