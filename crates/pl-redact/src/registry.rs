//! Tag name to sanitizer factory lookup.

use crate::config::RegistryConfig;
use crate::error::{RedactionError, Result};
use crate::placeholder::Placeholder;
use crate::sanitizer::{ParamSanitizer, SanitizerFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of sanitizer factories keyed by tag name.
///
/// A tag without a factory is never bound: the parameter is dropped and the
/// placeholder text stays in the template.
#[derive(Default)]
pub struct ParamSanitizerRegistry {
    factories: HashMap<String, Arc<dyn SanitizerFactory>>,
}

impl ParamSanitizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and start every factory named in `config`.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();
        for (tag, factory_config) in &config.tags {
            let mut factory = factory_config.build()?;
            factory.start()?;
            tracing::debug!(tag = %tag, factory = factory.name(), "registered sanitizer factory");
            registry.insert(tag.clone(), Arc::from(factory))?;
        }
        Ok(registry)
    }

    /// Start `factory` if needed and register it under `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, mut factory: F) -> Result<()>
    where
        F: SanitizerFactory + 'static,
    {
        if !factory.is_started() {
            factory.start()?;
        }
        self.insert(tag, Arc::new(factory))
    }

    /// Register an already configured factory under `tag`.
    ///
    /// The same factory may serve several tags. Tags are unique.
    pub fn insert(
        &mut self,
        tag: impl Into<String>,
        factory: Arc<dyn SanitizerFactory>,
    ) -> Result<()> {
        let tag = tag.into();
        if self.factories.contains_key(&tag) {
            return Err(RedactionError::Config(format!(
                "tag {{{}}} is already registered",
                tag
            )));
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn SanitizerFactory>> {
        self.factories.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered tag names, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Create a sanitizer for `tag`, or `None` when the tag is unknown or its
    /// factory is not started.
    pub fn create(
        &self,
        tag: &str,
        parameter: String,
        placeholder: Placeholder,
    ) -> Option<Box<dyn ParamSanitizer>> {
        self.factories.get(tag)?.create(tag, parameter, placeholder)
    }

    /// Stop every registered factory.
    pub fn stop_all(&self) {
        for factory in self.factories.values() {
            factory.stop();
        }
    }
}

impl std::fmt::Debug for ParamSanitizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.factories.iter().map(|(tag, factory)| (tag, factory.name())))
            .finish()
    }
}
