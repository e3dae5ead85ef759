//! Pluggable, parameterized transforms applied to the cache working copy.
//!
//! Filters are discovered per request: each raw parameter key is looked
//! up in an explicit `(asset tag, filter name)` registration table, and
//! matching filters run in the order their keys arrived. Each filter
//! declares its own parameter specs, which are aggregated into the
//! schema the request's raw parameters are parsed against.

mod css;
mod image;
pub(crate) mod js;

pub use css::CssMinify;
pub use image::{Colorize, Grayscale, Negative, Resize};
pub use js::JsMinify;

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::asset::{AssetTag, TypeOptions};
use crate::core::Result;
use crate::param::{ParamSpec, ParamValue};

/// Filename infix marking an already-minified source; minification
/// filters treat it as force-disabled.
pub const MINIFIED_INFIX: &str = ".min.";

pub trait Filter {
    fn name(&self) -> &'static str;

    /// Parameter specs this filter understands.
    fn param_specs(&self) -> Vec<ParamSpec>;

    /// Transform the cache working copy in place, or no-op when the
    /// controlling argument is falsy. Must be idempotent in the no-op
    /// case.
    fn apply(&self, cache_file: &Path, args: &ParamValue, options: &TypeOptions) -> Result<()>;
}

pub type FilterFactory = fn() -> Box<dyn Filter>;

/// Explicit registration table mapping `(asset tag, filter name)` to a
/// factory. Populated at startup; tests build their own.
pub struct FilterTable {
    map: FxHashMap<(AssetTag, String), FilterFactory>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    /// Table with the built-in filters registered.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(AssetTag::Css, "minify", || Box::new(CssMinify));
        table.register(AssetTag::JavaScript, "minify", || Box::new(JsMinify));
        table.register(AssetTag::Image, "resize", || Box::new(Resize));
        table.register(AssetTag::Image, "grayscale", || Box::new(Grayscale));
        table.register(AssetTag::Image, "negative", || Box::new(Negative));
        table.register(AssetTag::Image, "colorize", || Box::new(Colorize));
        table
    }

    pub fn register(&mut self, tag: AssetTag, name: &str, factory: FilterFactory) {
        self.map.insert((tag, name.to_string()), factory);
    }

    /// Instantiate the filters requested by the raw parameter keys, in
    /// arrival order, together with their aggregate parameter schema.
    /// Keys without a registered filter are simply not filters.
    pub fn discover(
        &self,
        tag: AssetTag,
        raw_params: &[(String, String)],
    ) -> (Vec<Box<dyn Filter>>, Vec<ParamSpec>) {
        let mut filters = Vec::new();
        let mut specs = Vec::new();
        let mut seen = Vec::new();
        for (key, _) in raw_params {
            if seen.contains(key) {
                continue;
            }
            if let Some(factory) = self.map.get(&(tag, key.clone())) {
                let filter = factory();
                specs.extend(filter.param_specs());
                filters.push(filter);
                seen.push(key.clone());
            }
        }
        (filters, specs)
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Is this source already minified by filename convention?
pub fn is_preminified(source: &Path) -> bool {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(MINIFIED_INFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(keys: &[&str]) -> Vec<(String, String)> {
        keys.iter()
            .map(|k| ((*k).to_string(), String::new()))
            .collect()
    }

    #[test]
    fn test_discovery_order_follows_raw_keys() {
        let table = FilterTable::with_defaults();
        let (filters, _) = table.discover(AssetTag::Image, &raw(&["grayscale", "resize"]));
        let names: Vec<_> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["grayscale", "resize"]);

        let (filters, _) = table.discover(AssetTag::Image, &raw(&["resize", "grayscale"]));
        let names: Vec<_> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["resize", "grayscale"]);
    }

    #[test]
    fn test_non_filter_keys_ignored() {
        let table = FilterTable::with_defaults();
        let (filters, _) = table.discover(AssetTag::Css, &raw(&["resize", "minify", "x"]));
        // resize is not registered for CSS
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name(), "minify");
    }

    #[test]
    fn test_duplicate_keys_discover_once() {
        let table = FilterTable::with_defaults();
        let (filters, _) = table.discover(AssetTag::Css, &raw(&["minify", "minify"]));
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn test_is_preminified() {
        assert!(is_preminified(Path::new("/js/app.min.js")));
        assert!(!is_preminified(Path::new("/js/app.js")));
        assert!(!is_preminified(Path::new("/js/minify.js")));
    }
}
