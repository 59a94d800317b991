use crate::{error::MailerError, templates::TemplateDescriptor};
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};
use tracing::debug;

/// Template descriptors by name
///
/// Names are unique: registering a second descriptor under a taken name is
/// rejected, so lookups are never ambiguous.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<BTreeMap<String, Arc<TemplateDescriptor>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template
    pub fn register(&self, template: TemplateDescriptor) -> Result<(), MailerError> {
        validate_descriptor(&template)?;

        let mut templates = self.templates.write().map_err(|_| {
            MailerError::configuration("Failed to acquire write lock on templates")
        })?;

        if templates.contains_key(&template.name) {
            return Err(MailerError::validation(
                "name",
                format!("Template '{}' is already registered", template.name),
            ));
        }

        debug!("Registered template: {}", template.name);
        templates.insert(template.name.clone(), Arc::new(template));
        Ok(())
    }

    /// Get template by name
    pub fn get(&self, name: &str) -> Result<Arc<TemplateDescriptor>, MailerError> {
        let templates = self.templates.read().map_err(|_| {
            MailerError::configuration("Failed to acquire read lock on templates")
        })?;

        templates
            .get(name)
            .cloned()
            .ok_or_else(|| MailerError::template_not_found(name))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.templates
            .read()
            .map(|templates| templates.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every descriptor, sorted by name
    pub fn all(&self) -> Vec<Arc<TemplateDescriptor>> {
        self.templates
            .read()
            .map(|templates| templates.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check the structural constraints of a descriptor
pub fn validate_descriptor(template: &TemplateDescriptor) -> Result<(), MailerError> {
    if template.name.trim().is_empty() {
        return Err(MailerError::validation("name", "Template name cannot be empty"));
    }

    if let crate::templates::MarkupSource::Path(path) = &template.markup {
        if path.trim().is_empty() {
            return Err(MailerError::validation(
                "markup",
                format!("Template '{}' has an empty markup path", template.name),
            ));
        }
    }

    if let Some(route) = &template.route {
        if !route.path.starts_with('/') {
            return Err(MailerError::validation(
                "route.path",
                format!(
                    "Route path '{}' of template '{}' must start with '/'",
                    route.path, template.name
                ),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRoute;

    #[test]
    fn test_register_and_get() {
        let registry = TemplateRegistry::new();
        registry
            .register(TemplateDescriptor::inline("welcome", "<p>Hi</p>").build())
            .unwrap();

        assert_eq!(registry.get("welcome").unwrap().name, "welcome");
        assert_eq!(registry.names(), vec!["welcome"]);
        assert!(matches!(
            registry.get("missing"),
            Err(MailerError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = TemplateRegistry::new();
        registry
            .register(TemplateDescriptor::inline("welcome", "a").build())
            .unwrap();

        let err = registry
            .register(TemplateDescriptor::inline("welcome", "b").build())
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(validate_descriptor(&TemplateDescriptor::inline("", "x").build()).is_err());
        assert!(validate_descriptor(&TemplateDescriptor::builder("a", " ").build()).is_err());

        let bad_route = TemplateDescriptor::inline("a", "x")
            .route(TemplateRoute::new("no-slash"))
            .build();
        assert!(validate_descriptor(&bad_route).is_err());
    }
}
