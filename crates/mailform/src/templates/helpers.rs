//! Template helpers
//!
//! A helper is a named function templates call as `{{name arg key=value}}`.
//! Helpers come from several namespaces (built-ins, host globals, caller
//! globals, per-template) and are merged into one [`HelperTable`] per
//! compiled template, later namespaces overriding earlier ones by name.

use crate::logger::Logger;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

/// Arguments of one helper invocation
#[derive(Debug, Clone, Copy)]
pub struct HelperCall<'a> {
    /// Name the helper was invoked under
    pub name: &'a str,
    /// Positional arguments
    pub params: &'a [Value],
    /// `key=value` arguments
    pub hash: &'a Map<String, Value>,
    /// Data the template is being rendered with
    pub context: &'a Value,
}

impl<'a> HelperCall<'a> {
    pub fn param(&self, index: usize) -> Option<&'a Value> {
        self.params.get(index)
    }

    pub fn str_param(&self, index: usize) -> Option<&'a str> {
        self.param(index).and_then(Value::as_str)
    }

    pub fn hash_value(&self, key: &str) -> Option<&'a Value> {
        self.hash.get(key)
    }

    /// Look up a field of the render data, like `this.field` in a template
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        self.context.get(key)
    }
}

/// A helper function
pub type HelperFn = Arc<dyn Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// Wrap a closure as a [`HelperFn`]
pub fn helper<F>(f: F) -> HelperFn
where
    F: Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Mapping from helper name to function
///
/// Immutable once handed to the compiler; merging always builds a new table.
#[derive(Clone, Default)]
pub struct HelperTable {
    helpers: BTreeMap<String, HelperFn>,
}

impl HelperTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a helper, builder style
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HelperCall<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, helper(f));
        self
    }

    /// Add or replace a helper
    pub fn insert(&mut self, name: impl Into<String>, f: HelperFn) {
        self.helpers.insert(name.into(), f);
    }

    /// Merge tables in precedence order; a later table wins on name clashes
    pub fn merge<'a>(sources: impl IntoIterator<Item = &'a HelperTable>) -> HelperTable {
        let mut merged = HelperTable::new();
        for source in sources {
            for (name, f) in &source.helpers {
                merged.helpers.insert(name.clone(), f.clone());
            }
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    /// Invoke a helper without arguments against `context`
    pub fn call(&self, name: &str, context: &Value) -> Option<anyhow::Result<Value>> {
        let f = self.helpers.get(name)?;
        let hash = Map::new();
        let call = HelperCall {
            name,
            params: &[],
            hash: &hash,
            context,
        };
        Some(f(&call))
    }

    /// Register every helper on a handlebars registry
    pub(crate) fn register_into(&self, registry: &mut Handlebars<'static>) {
        for (name, f) in &self.helpers {
            registry.register_helper(name, Box::new(BoundHelper(f.clone())));
        }
    }
}

impl fmt::Debug for HelperTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.helpers.keys()).finish()
    }
}

/// Adapter exposing a [`HelperFn`] to handlebars
struct BoundHelper(HelperFn);

impl HelperDef for BoundHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let params: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        let hash: Map<String, Value> = h
            .hash()
            .iter()
            .map(|(k, v)| (k.to_string(), v.value().clone()))
            .collect();

        let call = HelperCall {
            name: h.name(),
            params: &params,
            hash: &hash,
            context: ctx.data(),
        };

        (self.0)(&call).map(ScopedJson::Derived).map_err(|e| {
            RenderErrorReason::Other(format!("helper '{}' failed: {:#}", h.name(), e)).into()
        })
    }
}

/// Render a helper value as text: strings verbatim, null as empty
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    let root = base.strip_suffix('/').unwrap_or(base);
    if path.starts_with('/') {
        format!("{}{}", root, path)
    } else {
        format!("{}/{}", root, path)
    }
}

/// Named application routes `emailUrlFor` can build links to
#[derive(Debug, Clone, Default)]
pub struct NamedRoutes {
    routes: HashMap<String, String>,
}

impl NamedRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for a path pattern such as `/users/:id`
    pub fn insert(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.routes.insert(name.into(), pattern.into());
    }

    /// Fill a route pattern's `:param` segments; `None` when the route is
    /// unknown or a parameter is missing
    pub fn path_for(&self, name: &str, params: &Map<String, Value>) -> Option<String> {
        let pattern = self.routes.get(name)?;
        let mut segments = Vec::new();

        for segment in pattern.split('/') {
            match segment.strip_prefix(':') {
                Some(key) => {
                    let key = key.trim_end_matches('?');
                    let value = params.get(key).map(value_to_text)?;
                    segments.push(value);
                }
                None => segments.push(segment.to_string()),
            }
        }

        Some(segments.join("/"))
    }
}

/// When `enumerate` puts a comma before the final "and"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OxfordComma {
    Always,
    Never,
    /// Only for lists of at least this many items
    AtLeast(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerateOptions {
    pub limit: Option<usize>,
    pub oxford_comma: OxfordComma,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            limit: None,
            oxford_comma: OxfordComma::Always,
        }
    }
}

/// Join items as an English list: "A, B, and C"
pub fn enumerate<S: AsRef<str>>(items: &[S], options: EnumerateOptions) -> String {
    if items.is_empty() || options.limit == Some(0) {
        return String::new();
    }

    if items.len() == 1 || options.limit == Some(1) {
        return items[0].as_ref().to_string();
    }

    let items = match options.limit {
        Some(limit) if limit < items.len() => &items[..limit],
        _ => items,
    };

    let (last, init) = match items.split_last() {
        Some(parts) => parts,
        None => return String::new(),
    };

    let oxford = match options.oxford_comma {
        OxfordComma::Always => true,
        OxfordComma::Never => false,
        OxfordComma::AtLeast(n) => items.len() >= n,
    };
    let suffix = if oxford { ", and " } else { " and " };

    let head: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
    format!("{}{}{}", head.join(", "), suffix, last.as_ref())
}

fn oxford_from_value(value: &Value) -> Option<OxfordComma> {
    match value {
        Value::Bool(true) => Some(OxfordComma::Always),
        Value::Bool(false) => Some(OxfordComma::Never),
        Value::Number(n) => n.as_u64().map(|n| OxfordComma::AtLeast(n as usize)),
        _ => None,
    }
}

fn limit_from_value(value: &Value) -> Option<usize> {
    match value.as_i64() {
        Some(n) if n >= 0 => Some(n as usize),
        _ => None,
    }
}

/// Built-in helpers: `baseUrl`, `emailUrlFor`, `enumerate`, `capitalize`
pub fn builtin_helpers(
    base_url: &str,
    routes: &NamedRoutes,
    logger: Arc<dyn Logger>,
) -> HelperTable {
    let base = base_url.to_string();
    let url_base = base_url.to_string();
    let routes = routes.clone();

    HelperTable::new()
        .with("baseUrl", move |call| {
            let path = call.param(0).map(value_to_text).unwrap_or_default();
            Ok(Value::String(join_url(&base, &path)))
        })
        .with("emailUrlFor", move |call| {
            let route_name = call.param(0).map(value_to_text).unwrap_or_default();
            match routes.path_for(&route_name, call.hash) {
                Some(path) => Ok(Value::String(join_url(&url_base, &path))),
                None => {
                    logger.warn(&format!(
                        "No named route '{}' (or a parameter is missing), emailUrlFor can't render a path to it.",
                        route_name
                    ));
                    Ok(Value::String("//".to_string()))
                }
            }
        })
        .with("enumerate", |call| {
            let items: Vec<String> = match call.param(0) {
                Some(Value::Array(values)) => values.iter().map(value_to_text).collect(),
                _ => return Ok(Value::String(String::new())),
            };

            let mut options = EnumerateOptions::default();
            if let Some(limit) = call.param(1).and_then(limit_from_value) {
                options.limit = Some(limit);
            }
            if let Some(oxford) = call.param(2).and_then(oxford_from_value) {
                options.oxford_comma = oxford;
            }
            if let Some(limit) = call.hash_value("limit").and_then(limit_from_value) {
                options.limit = Some(limit);
            }
            if let Some(oxford) = call.hash_value("oxfordComma").and_then(oxford_from_value) {
                options.oxford_comma = oxford;
            }

            Ok(Value::String(enumerate(&items, options)))
        })
        .with("capitalize", |call| {
            let text = call.param(0).map(value_to_text).unwrap_or_default();
            Ok(Value::String(capitalize_first(&text)))
        })
}

/// Upper-case the first character, leave the rest alone
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RecordingLogger;
    use serde_json::json;

    fn names() -> Vec<&'static str> {
        vec!["Johan", "John", "Paul", "Ringo"]
    }

    #[test]
    fn test_enumerate_defaults() {
        assert_eq!(
            enumerate(&names(), EnumerateOptions::default()),
            "Johan, John, Paul, and Ringo"
        );
        assert_eq!(enumerate(&["A"], EnumerateOptions::default()), "A");
        assert_eq!(enumerate::<&str>(&[], EnumerateOptions::default()), "");
    }

    #[test]
    fn test_enumerate_without_oxford_comma() {
        let options = EnumerateOptions {
            oxford_comma: OxfordComma::Never,
            ..Default::default()
        };
        assert_eq!(enumerate(&["A", "B"], options), "A and B");
        assert_eq!(enumerate(&names(), options), "Johan, John, Paul and Ringo");
    }

    #[test]
    fn test_enumerate_limit_and_threshold() {
        let options = EnumerateOptions {
            limit: Some(2),
            oxford_comma: OxfordComma::AtLeast(3),
        };
        assert_eq!(enumerate(&names(), options), "Johan and John");

        let options = EnumerateOptions {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(enumerate(&names(), options), "Johan");

        let options = EnumerateOptions {
            limit: None,
            oxford_comma: OxfordComma::AtLeast(3),
        };
        assert_eq!(enumerate(&names(), options), "Johan, John, Paul, and Ringo");
    }

    #[test]
    fn test_merge_precedence() {
        let global = HelperTable::new()
            .with("x", |_| Ok(json!("global")))
            .with("only_global", |_| Ok(json!("g")));
        let local = HelperTable::new().with("x", |_| Ok(json!("local")));

        let merged = HelperTable::merge([&global, &local]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.call("x", &Value::Null).unwrap().unwrap(), json!("local"));
        assert_eq!(
            merged.call("only_global", &Value::Null).unwrap().unwrap(),
            json!("g")
        );

        let merged = HelperTable::merge([&local, &global]);
        assert_eq!(merged.call("x", &Value::Null).unwrap().unwrap(), json!("global"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://root.com/", "/path"), "http://root.com/path");
        assert_eq!(join_url("http://root.com", "path"), "http://root.com/path");
    }

    #[test]
    fn test_named_routes() {
        let mut routes = NamedRoutes::new();
        routes.insert("profile", "/users/:id/profile");

        let mut params = Map::new();
        params.insert("id".to_string(), json!(42));
        assert_eq!(
            routes.path_for("profile", &params).as_deref(),
            Some("/users/42/profile")
        );
        assert!(routes.path_for("profile", &Map::new()).is_none());
        assert!(routes.path_for("missing", &params).is_none());
    }

    #[test]
    fn test_builtins_email_url_for_unknown_route_warns() {
        let logger = Arc::new(RecordingLogger::new());
        let builtins = builtin_helpers("http://root.com", &NamedRoutes::new(), logger.clone());

        let f = builtins.get("emailUrlFor").unwrap();
        let hash = Map::new();
        let params = [json!("nowhere")];
        let call = HelperCall {
            name: "emailUrlFor",
            params: &params,
            hash: &hash,
            context: &Value::Null,
        };

        assert_eq!(f(&call).unwrap(), json!("//"));
        assert_eq!(logger.warnings().len(), 1);
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("johan"), "Johan");
        assert_eq!(capitalize_first(""), "");
    }
}
