//! CSS minification filter, backed by lightningcss.

use std::fs;
use std::path::Path;

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

use super::Filter;
use crate::asset::TypeOptions;
use crate::core::{PipelineError, Result};
use crate::param::{Cast, ParamSpec, ParamValue};

pub struct CssMinify;

impl Filter for CssMinify {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("minify")
                .regex("true|false|t|f|yes|no|y|n")
                .default_value("false")
                .cast(Cast::Bool),
        ]
    }

    fn apply(&self, cache_file: &Path, args: &ParamValue, _options: &TypeOptions) -> Result<()> {
        if !args.is_truthy() {
            return Ok(());
        }
        let source =
            fs::read_to_string(cache_file).map_err(|e| PipelineError::io(cache_file, e))?;
        let minified = minify_css(&source)?;
        fs::write(cache_file, minified).map_err(|e| PipelineError::io(cache_file, e))
    }
}

/// Minify CSS source code.
pub fn minify_css(source: &str) -> Result<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| PipelineError::compilation("CSS minifier", e.to_string()))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| PipelineError::compilation("CSS minifier", e.to_string()))?;
    Ok(result.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_minify_strips_whitespace_and_comments() {
        let out = minify_css("/* banner */\nbody {\n  color: #ff0000;\n}\n").unwrap();
        assert!(!out.contains("banner"));
        assert!(!out.contains('\n'));
        assert!(out.contains("body"));
    }

    #[test]
    fn test_minify_invalid_css_is_compilation_error() {
        // Invalid selector, rejected at parse time
        let err = minify_css("div..bad { color: red; }").unwrap_err();
        assert!(matches!(err, PipelineError::Compilation { .. }));
    }

    #[test]
    fn test_falsy_argument_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.css");
        let original = "body {  color : red ; }\n";
        fs::write(&file, original).unwrap();

        CssMinify
            .apply(
                &file,
                &ParamValue::Bool(false),
                &TypeOptions::Css(crate::config::CssOptions::default()),
            )
            .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }
}
