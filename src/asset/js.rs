//! JavaScript asset type. TypeScript sources are transpiled to plain
//! JavaScript before the filter chain runs; everything else passes
//! through as-is.

use std::fs;
use std::path::Path;

use oxc::allocator::Allocator;
use oxc::codegen::Codegen;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};

use super::{AssetTag, AssetType, TypeOptions, TypeStrategy};
use crate::cache::CacheRecord;
use crate::config::Config;
use crate::core::{PipelineError, Result};
use crate::filter::js::parse_error;
use crate::request::Request;
use crate::utils::mime;

pub fn asset_type(_config: &Config) -> AssetType {
    AssetType::new(
        AssetTag::JavaScript,
        Box::new(JsStrategy),
        TypeOptions::JavaScript,
    )
}

pub struct JsStrategy;

impl TypeStrategy for JsStrategy {
    fn content_type(&self, _ext: &str) -> &'static str {
        mime::types::JAVASCRIPT
    }

    fn preprocess(
        &self,
        source: &Path,
        _request: &Request,
        _options: &TypeOptions,
    ) -> Result<CacheRecord> {
        let raw = fs::read_to_string(source).map_err(|e| PipelineError::io(source, e))?;
        if is_typescript(source) {
            return Ok(CacheRecord::Plain(transpile_ts(&raw, source)?.into_bytes()));
        }
        Ok(CacheRecord::Plain(raw.into_bytes()))
    }
}

fn is_typescript(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ts"))
}

/// Strip types and lower TypeScript-only syntax; no minification here,
/// that stays the minify filter's job.
pub fn transpile_ts(source: &str, path: &Path) -> Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::ts()).parse();
    if !ret.errors.is_empty() {
        return Err(parse_error(&ret.errors));
    }
    let mut program = ret.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let options = TransformOptions::default();
    let ret = Transformer::new(&allocator, path, &options)
        .build_with_scoping(scoping, &mut program);
    if !ret.errors.is_empty() {
        return Err(parse_error(&ret.errors));
    }

    Ok(Codegen::new().build(&program).code)
}
