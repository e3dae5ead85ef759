//! Extension registry: maps file extensions to asset-type factories.
//!
//! An explicit value owned by the dispatcher, populated once at startup
//! and read-only during request handling. Lookup is a linear scan in
//! registration order, so re-registering an extension earlier in the
//! list intentionally shadows a later group. Tests construct isolated
//! registries.

use std::sync::Arc;

use crate::asset::AssetType;
use crate::config::Config;
use crate::core::{PipelineError, Result};

/// Builds an [`AssetType`] for a resolved request.
pub type AssetFactory = Arc<dyn Fn(&Config) -> AssetType + Send + Sync>;

struct Group {
    extensions: Vec<String>,
    factory: AssetFactory,
}

#[derive(Default)]
pub struct Registry {
    groups: Vec<Group>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in CSS, JavaScript and image types.
    pub fn with_defaults() -> Self {
        use crate::asset::{css, image, js};

        let mut registry = Self::new();
        registry.register(
            &["css", "scss"],
            Arc::new(|config: &Config| css::asset_type(config)),
        );
        registry.register(
            &["js", "ts"],
            Arc::new(|config: &Config| js::asset_type(config)),
        );
        registry.register(
            &["jpg", "jpeg", "png", "gif", "webp"],
            Arc::new(|config: &Config| image::asset_type(config)),
        );
        registry
    }

    /// Append a group of extensions resolving through `factory`.
    pub fn register(&mut self, extensions: &[&str], factory: AssetFactory) {
        self.groups.push(Group {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            factory,
        });
    }

    /// Remove extensions from every group, pruning groups left empty.
    pub fn unregister(&mut self, extensions: &[&str]) {
        for group in &mut self.groups {
            group.extensions.retain(|e| !extensions.contains(&e.as_str()));
        }
        self.groups.retain(|g| !g.extensions.is_empty());
    }

    /// Resolve the factory for an extension; first matching group wins.
    pub fn resolve(&self, ext: &str) -> Result<AssetFactory> {
        self.find(ext)
            .map(|g| Arc::clone(&g.factory))
            .ok_or_else(|| PipelineError::UnregisteredExtension(ext.to_string()))
    }

    /// The full extension group containing `ext`, for enforcing that all
    /// files in a request share one asset type.
    pub fn extension_group(&self, ext: &str) -> Result<&[String]> {
        self.find(ext)
            .map(|g| g.extensions.as_slice())
            .ok_or_else(|| PipelineError::UnregisteredExtension(ext.to_string()))
    }

    fn find(&self, ext: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.extensions.iter().any(|e| e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::css;

    fn css_factory() -> AssetFactory {
        Arc::new(|config: &Config| css::asset_type(config))
    }

    #[test]
    fn test_resolve_registered() {
        let registry = Registry::with_defaults();
        assert!(registry.resolve("css").is_ok());
        assert!(registry.resolve("jpeg").is_ok());
    }

    #[test]
    fn test_resolve_unregistered() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.resolve("exe"),
            Err(PipelineError::UnregisteredExtension(ext)) if ext == "exe"
        ));
    }

    #[test]
    fn test_extension_group() {
        let registry = Registry::with_defaults();
        let group = registry.extension_group("scss").unwrap();
        assert!(group.contains(&"css".to_string()));
        assert!(!group.contains(&"js".to_string()));
    }

    #[test]
    fn test_unregister_prunes_empty_groups() {
        let mut registry = Registry::new();
        registry.register(&["css"], css_factory());
        registry.unregister(&["css"]);
        assert!(registry.resolve("css").is_err());
    }

    #[test]
    fn test_registration_order_shadows() {
        let mut registry = Registry::new();
        registry.register(&["css", "custom"], css_factory());
        registry.register(&["custom"], css_factory());
        // First group containing the extension wins
        let group = registry.extension_group("custom").unwrap();
        assert_eq!(group, ["css".to_string(), "custom".to_string()]);
    }
}
