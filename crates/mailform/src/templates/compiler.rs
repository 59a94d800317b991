use crate::{
    error::MailerError,
    source::FileResolver,
    templates::{
        registry::validate_descriptor, HelperTable, LayoutDescriptor, MarkupSource,
        TemplateDescriptor,
    },
};
use handlebars::Handlebars;
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};
use tracing::debug;

/// A compiled template or layout
///
/// Owns its handlebars registry, holding this one template and the merged
/// helper table it was compiled with. Never mutated after construction; a
/// recompile swaps in a whole new entry.
pub struct CompiledTemplate {
    name: String,
    registry: Handlebars<'static>,
    helpers: HelperTable,
}

impl CompiledTemplate {
    fn build(name: &str, source: &str, helpers: HelperTable) -> Result<Self, MailerError> {
        let mut registry = Handlebars::new();
        helpers.register_into(&mut registry);
        registry
            .register_template_string(name, source)
            .map_err(|e| MailerError::Syntax {
                template: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            registry,
            helpers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn helpers(&self) -> &HelperTable {
        &self.helpers
    }

    /// Render with `data` as the template context
    pub fn render(&self, data: &Value) -> Result<String, MailerError> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| MailerError::render(&self.name, e.to_string()))
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("helpers", &self.helpers)
            .finish()
    }
}

/// How many compiles the compiler has performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub templates: usize,
    pub layouts: usize,
}

/// Compiles descriptors and caches the results by name
///
/// Templates are recompiled on every `compile` call. Layouts are compiled at
/// most once per name unless a recompile is requested.
pub struct TemplateCompiler {
    resolver: Arc<dyn FileResolver>,
    /// Helper namespaces below the descriptor's own, lowest precedence first
    shared_helpers: Vec<HelperTable>,
    compiled: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
    layouts: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
    template_compiles: AtomicUsize,
    layout_compiles: AtomicUsize,
}

impl TemplateCompiler {
    /// `shared_helpers` are merged in order beneath each descriptor's helpers
    pub fn new(resolver: Arc<dyn FileResolver>, shared_helpers: Vec<HelperTable>) -> Self {
        Self {
            resolver,
            shared_helpers,
            compiled: RwLock::new(HashMap::new()),
            layouts: RwLock::new(HashMap::new()),
            template_compiles: AtomicUsize::new(0),
            layout_compiles: AtomicUsize::new(0),
        }
    }

    /// Compile `template`, compiling `layout` first if it has not been yet
    pub fn compile(
        &self,
        template: &TemplateDescriptor,
        layout: Option<&LayoutDescriptor>,
    ) -> Result<Arc<CompiledTemplate>, MailerError> {
        self.compile_inner(template, layout, false)
    }

    /// Compile `template` and its layout again, picking up source changes
    pub fn recompile(
        &self,
        template: &TemplateDescriptor,
        layout: Option<&LayoutDescriptor>,
    ) -> Result<Arc<CompiledTemplate>, MailerError> {
        self.compile_inner(template, layout, true)
    }

    fn compile_inner(
        &self,
        template: &TemplateDescriptor,
        layout: Option<&LayoutDescriptor>,
        refresh_layout: bool,
    ) -> Result<Arc<CompiledTemplate>, MailerError> {
        validate_descriptor(template)?;

        let source = self.read_markup(&template.markup)?;

        if let Some(layout) = layout {
            self.compile_layout(layout, refresh_layout)?;
        }

        let helpers = self.helpers_for(&template.helpers);
        let compiled = Arc::new(CompiledTemplate::build(&template.name, &source, helpers)?);

        let mut entries = self.compiled.write().map_err(|_| {
            MailerError::configuration("Failed to acquire write lock on compiled templates")
        })?;
        entries.insert(template.name.clone(), compiled.clone());
        self.template_compiles.fetch_add(1, Ordering::Relaxed);

        debug!("Compiled template: {}", template.name);
        Ok(compiled)
    }

    /// Compiled layout, compiling it on first use or when `refresh` is set
    pub fn compile_layout(
        &self,
        layout: &LayoutDescriptor,
        refresh: bool,
    ) -> Result<Arc<CompiledTemplate>, MailerError> {
        if !refresh {
            if let Some(existing) = self.layout(&layout.name) {
                return Ok(existing);
            }
        }

        // Held across the compile so concurrent first uses compile once.
        let mut layouts = self.layouts.write().map_err(|_| {
            MailerError::configuration("Failed to acquire write lock on compiled layouts")
        })?;

        if !refresh {
            if let Some(existing) = layouts.get(&layout.name) {
                return Ok(existing.clone());
            }
        }

        let source = self.read_markup(&layout.markup)?;
        let helpers = self.helpers_for(&layout.helpers);
        let compiled = Arc::new(CompiledTemplate::build(&layout.name, &source, helpers)?);

        layouts.insert(layout.name.clone(), compiled.clone());
        self.layout_compiles.fetch_add(1, Ordering::Relaxed);

        debug!("Compiled layout: {}", layout.name);
        Ok(compiled)
    }

    /// Compiled template by name
    pub fn get(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.compiled.read().ok()?.get(name).cloned()
    }

    /// Compiled layout by name
    pub fn layout(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.layouts.read().ok()?.get(name).cloned()
    }

    pub fn stats(&self) -> CompileStats {
        CompileStats {
            templates: self.template_compiles.load(Ordering::Relaxed),
            layouts: self.layout_compiles.load(Ordering::Relaxed),
        }
    }

    fn read_markup(&self, markup: &MarkupSource) -> Result<String, MailerError> {
        match markup {
            MarkupSource::Path(path) => self.resolver.read(path),
            MarkupSource::Inline(text) => Ok(text.clone()),
        }
    }

    fn helpers_for(&self, local: &HelperTable) -> HelperTable {
        HelperTable::merge(self.shared_helpers.iter().chain(std::iter::once(local)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryResolver;
    use serde_json::json;

    fn compiler(resolver: MemoryResolver) -> TemplateCompiler {
        let globals = HelperTable::new().with("shout", |call| {
            Ok(json!(call.str_param(0).unwrap_or_default().to_uppercase()))
        });
        TemplateCompiler::new(Arc::new(resolver), vec![globals])
    }

    #[test]
    fn test_compile_and_render() {
        let compiler = compiler(MemoryResolver::new().with_file("hi.html", "<p>{{shout name}}</p>"));
        let template = TemplateDescriptor::builder("hi", "hi.html").build();

        let compiled = compiler.compile(&template, None).unwrap();
        assert_eq!(compiled.render(&json!({"name": "paul"})).unwrap(), "<p>PAUL</p>");
        assert!(compiler.get("hi").is_some());
    }

    #[test]
    fn test_missing_markup_is_reported() {
        let compiler = compiler(MemoryResolver::new());
        let template = TemplateDescriptor::builder("gone", "gone.html").build();

        let err = compiler.compile(&template, None).unwrap_err();
        assert!(matches!(err, MailerError::SourceUnavailable { .. }));
        assert!(compiler.get("gone").is_none());
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let compiler = compiler(MemoryResolver::new());
        let template = TemplateDescriptor::inline("broken", "{{#if flag}}never closed").build();

        let err = compiler.compile(&template, None).unwrap_err();
        assert!(matches!(err, MailerError::Syntax { .. }));
    }

    #[test]
    fn test_layout_compiled_once() {
        let compiler = compiler(MemoryResolver::new());
        let layout = LayoutDescriptor::inline("base", "<main>{{{body}}}</main>").build();
        let a = TemplateDescriptor::inline("a", "A").build();
        let b = TemplateDescriptor::inline("b", "B").build();

        compiler.compile(&a, Some(&layout)).unwrap();
        compiler.compile(&b, Some(&layout)).unwrap();
        compiler.compile(&a, Some(&layout)).unwrap();

        assert_eq!(
            compiler.stats(),
            CompileStats {
                templates: 3,
                layouts: 1
            }
        );

        compiler.recompile(&a, Some(&layout)).unwrap();
        assert_eq!(compiler.stats().layouts, 2);
    }

    #[test]
    fn test_recompile_replaces_entry() {
        let resolver = Arc::new(MemoryResolver::new().with_file("t.html", "v1"));
        let compiler = TemplateCompiler::new(resolver.clone(), Vec::new());
        let template = TemplateDescriptor::builder("t", "t.html").build();

        let first = compiler.compile(&template, None).unwrap();
        resolver.insert("t.html", "v2");
        let second = compiler.recompile(&template, None).unwrap();

        assert_eq!(first.render(&Value::Null).unwrap(), "v1");
        assert_eq!(second.render(&Value::Null).unwrap(), "v2");
        assert!(Arc::ptr_eq(&compiler.get("t").unwrap(), &second));
    }

    #[test]
    fn test_local_helper_overrides_shared() {
        let compiler = compiler(MemoryResolver::new());
        let template = TemplateDescriptor::inline("t", "{{shout \"x\"}}")
            .helper("shout", |_| Ok(json!("local")))
            .build();

        let compiled = compiler.compile(&template, None).unwrap();
        assert_eq!(compiled.render(&Value::Null).unwrap(), "local");
    }
}
