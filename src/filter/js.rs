//! JavaScript minification, backed by oxc.

use std::fs;
use std::path::Path;

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::Filter;
use crate::asset::TypeOptions;
use crate::core::{PipelineError, Result};
use crate::param::{Cast, ParamSpec, ParamValue};

pub struct JsMinify;

impl Filter for JsMinify {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("minify")
                .alias("m")
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
        let minified = minify_js(&source)?;
        fs::write(cache_file, minified).map_err(|e| PipelineError::io(cache_file, e))
    }
}

/// Minify JavaScript source code.
pub fn minify_js(source: &str) -> Result<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::mjs();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(parse_error(&ret.errors));
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Ok(code)
}

pub(crate) fn parse_error(errors: &[oxc::diagnostics::OxcDiagnostic]) -> PipelineError {
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    PipelineError::compilation("JavaScript minifier", joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_minify_shrinks_source() {
        let source = "function add(first, second) {\n  return first + second;\n}\nexport { add };\n";
        let out = minify_js(source).unwrap();
        assert!(out.len() < source.len());
        assert!(!out.contains('\n') || out.lines().count() == 1);
    }

    #[test]
    fn test_minify_syntax_error() {
        let err = minify_js("function {").unwrap_err();
        assert!(matches!(err, PipelineError::Compilation { .. }));
    }

    #[test]
    fn test_falsy_argument_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        let original = "var answer = 42;\n";
        fs::write(&file, original).unwrap();

        JsMinify
            .apply(&file, &ParamValue::Bool(false), &TypeOptions::JavaScript)
            .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }
}
