pub mod compiler;
pub mod helpers;
pub mod registry;

pub use compiler::*;
pub use helpers::*;
pub use registry::*;

use serde_json::Value;
use std::{collections::HashMap, fmt, sync::Arc};

/// Where a template's markup comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupSource {
    /// Relative path read through the file resolver
    Path(String),
    /// Markup given directly
    Inline(String),
}

/// A stylesheet applied to rendered markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    /// Plain CSS file
    Css(String),
    /// SCSS file, compiled to CSS before inlining
    Scss(String),
    /// CSS text given directly
    Inline(String),
}

/// Which layout wraps a template
#[derive(Debug, Clone, Default)]
pub enum LayoutChoice {
    /// The mailer's default layout, if one is configured
    #[default]
    Default,
    /// This specific layout
    Custom(Arc<LayoutDescriptor>),
    /// No layout at all
    Suppressed,
}

/// Produces route data from URL parameters for preview and test sends
pub type RouteDataFn =
    Arc<dyn Fn(&HashMap<String, String>) -> anyhow::Result<Value> + Send + Sync>;

/// Preview route attached to a template
#[derive(Clone)]
pub struct TemplateRoute {
    /// Path template, e.g. `/welcome/:name`
    pub path: String,
    /// Data for the render, built from path parameters
    pub data: Option<RouteDataFn>,
}

impl TemplateRoute {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }

    pub fn with_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&HashMap<String, String>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TemplateRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRoute")
            .field("path", &self.path)
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// Email template definition
#[derive(Debug, Clone)]
pub struct TemplateDescriptor {
    /// Unique name, also the key of the compiled entry
    pub name: String,
    /// Template body markup
    pub markup: MarkupSource,
    /// Stylesheets inlined into the rendered template, in order
    pub stylesheets: Vec<StylesheetSource>,
    /// CSS file handed to the layout as `css`, read raw at render time
    pub extra_css: Option<String>,
    /// Layout selection
    pub layout: LayoutChoice,
    /// Helpers visible to this template only
    pub helpers: HelperTable,
    /// Preview route
    pub route: Option<TemplateRoute>,
}

/// Shared layout definition
#[derive(Debug, Clone)]
pub struct LayoutDescriptor {
    pub name: String,
    pub markup: MarkupSource,
    pub stylesheets: Vec<StylesheetSource>,
    pub helpers: HelperTable,
}

/// Template builder for fluent API
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    template: TemplateDescriptor,
}

/// Layout builder for fluent API
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    layout: LayoutDescriptor,
}

impl TemplateDescriptor {
    /// Start a template whose markup lives at `path`
    pub fn builder(name: impl Into<String>, path: impl Into<String>) -> TemplateBuilder {
        Self::builder_with_markup(name, MarkupSource::Path(path.into()))
    }

    /// Start a template from markup text
    pub fn inline(name: impl Into<String>, markup: impl Into<String>) -> TemplateBuilder {
        Self::builder_with_markup(name, MarkupSource::Inline(markup.into()))
    }

    fn builder_with_markup(name: impl Into<String>, markup: MarkupSource) -> TemplateBuilder {
        TemplateBuilder {
            template: Self {
                name: name.into(),
                markup,
                stylesheets: Vec::new(),
                extra_css: None,
                layout: LayoutChoice::Default,
                helpers: HelperTable::new(),
                route: None,
            },
        }
    }
}

impl TemplateBuilder {
    pub fn css(mut self, path: impl Into<String>) -> Self {
        self.template.stylesheets.push(StylesheetSource::Css(path.into()));
        self
    }

    pub fn scss(mut self, path: impl Into<String>) -> Self {
        self.template.stylesheets.push(StylesheetSource::Scss(path.into()));
        self
    }

    pub fn inline_css(mut self, css: impl Into<String>) -> Self {
        self.template.stylesheets.push(StylesheetSource::Inline(css.into()));
        self
    }

    pub fn extra_css(mut self, path: impl Into<String>) -> Self {
        self.template.extra_css = Some(path.into());
        self
    }

    pub fn layout(mut self, layout: LayoutDescriptor) -> Self {
        self.template.layout = LayoutChoice::Custom(Arc::new(layout));
        self
    }

    pub fn without_layout(mut self) -> Self {
        self.template.layout = LayoutChoice::Suppressed;
        self
    }

    pub fn helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.template.helpers.insert(name, helpers::helper(f));
        self
    }

    pub fn helpers(mut self, helpers: HelperTable) -> Self {
        self.template.helpers = HelperTable::merge([&self.template.helpers, &helpers]);
        self
    }

    pub fn route(mut self, route: TemplateRoute) -> Self {
        self.template.route = Some(route);
        self
    }

    pub fn build(self) -> TemplateDescriptor {
        self.template
    }
}

impl LayoutDescriptor {
    pub fn builder(name: impl Into<String>, path: impl Into<String>) -> LayoutBuilder {
        Self::builder_with_markup(name, MarkupSource::Path(path.into()))
    }

    pub fn inline(name: impl Into<String>, markup: impl Into<String>) -> LayoutBuilder {
        Self::builder_with_markup(name, MarkupSource::Inline(markup.into()))
    }

    fn builder_with_markup(name: impl Into<String>, markup: MarkupSource) -> LayoutBuilder {
        LayoutBuilder {
            layout: Self {
                name: name.into(),
                markup,
                stylesheets: Vec::new(),
                helpers: HelperTable::new(),
            },
        }
    }
}

impl LayoutBuilder {
    pub fn css(mut self, path: impl Into<String>) -> Self {
        self.layout.stylesheets.push(StylesheetSource::Css(path.into()));
        self
    }

    pub fn scss(mut self, path: impl Into<String>) -> Self {
        self.layout.stylesheets.push(StylesheetSource::Scss(path.into()));
        self
    }

    pub fn inline_css(mut self, css: impl Into<String>) -> Self {
        self.layout.stylesheets.push(StylesheetSource::Inline(css.into()));
        self
    }

    pub fn helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.layout.helpers.insert(name, helpers::helper(f));
        self
    }

    pub fn build(self) -> LayoutDescriptor {
        self.layout
    }
}

/// Resolve the layout that applies to `template`, given the mailer default
pub fn effective_layout(
    template: &TemplateDescriptor,
    default: Option<&Arc<LayoutDescriptor>>,
) -> Option<Arc<LayoutDescriptor>> {
    match &template.layout {
        LayoutChoice::Custom(layout) => Some(layout.clone()),
        LayoutChoice::Default => default.cloned(),
        LayoutChoice::Suppressed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let template = TemplateDescriptor::builder("welcome", "welcome/template.html")
            .css("welcome/style.css")
            .scss("welcome/style.scss")
            .extra_css("welcome/media.css")
            .helper("greeting", |_| Ok(Value::String("hi".into())))
            .route(TemplateRoute::new("/welcome/:name"))
            .build();

        assert_eq!(template.name, "welcome");
        assert_eq!(
            template.markup,
            MarkupSource::Path("welcome/template.html".into())
        );
        assert_eq!(template.stylesheets.len(), 2);
        assert_eq!(template.extra_css.as_deref(), Some("welcome/media.css"));
        assert!(template.helpers.contains("greeting"));
        assert!(matches!(template.layout, LayoutChoice::Default));
    }

    #[test]
    fn test_effective_layout() {
        let default = Arc::new(LayoutDescriptor::inline("base", "{{{body}}}").build());
        let other = LayoutDescriptor::inline("other", "<div>{{{body}}}</div>").build();

        let plain = TemplateDescriptor::inline("a", "").build();
        let custom = TemplateDescriptor::inline("b", "").layout(other).build();
        let bare = TemplateDescriptor::inline("c", "").without_layout().build();

        assert_eq!(
            effective_layout(&plain, Some(&default)).map(|l| l.name.clone()),
            Some("base".to_string())
        );
        assert!(effective_layout(&plain, None).is_none());
        assert_eq!(
            effective_layout(&custom, Some(&default)).map(|l| l.name.clone()),
            Some("other".to_string())
        );
        assert!(effective_layout(&bare, Some(&default)).is_none());
    }
}
